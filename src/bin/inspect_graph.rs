//! Print the input/output contract of an exported ONNX graph
//!
//! Usage: cargo run --bin inspect_graph -- model/lgb_stock_model.onnx [--json]

use anyhow::Result;
use clap::Parser;
use gbm_direction::export::OnnxGraph;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Inspect an exported ONNX graph")]
struct Args {
    /// Path to the .onnx file
    #[arg(default_value = "model/lgb_stock_model.onnx")]
    graph: PathBuf,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gbm_direction=warn")))
        .init();

    let args = Args::parse();
    debug!("Loading graph from {}", args.graph.display());
    let graph = OnnxGraph::load(&args.graph)?;
    let summary = graph.summary();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Graph: {} (ir_version {}, producer {})", summary.name, summary.ir_version, summary.producer);
    println!("Opsets:");
    for opset in &summary.opsets {
        println!("   {} v{}", opset.domain, opset.version);
    }
    println!("Inputs:");
    for input in &summary.inputs {
        println!(
            "   {}  elem_type={} ({})  shape={}",
            input.name,
            input.elem_type,
            input.elem_type_name,
            input.shape_string()
        );
    }
    println!("Outputs:");
    for output in &summary.outputs {
        println!(
            "   {}  elem_type={} ({})  shape={}",
            output.name,
            output.elem_type,
            output.elem_type_name,
            output.shape_string()
        );
    }
    println!("Operators: {}", summary.operators.join(", "));

    Ok(())
}
