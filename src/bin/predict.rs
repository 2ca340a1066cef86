//! Predict tomorrow's direction from the latest bar of a price CSV
//!
//! Usage: cargo run --bin predict -- data/stock_history.csv --model model/lgb_stock_model.txt

use anyhow::{bail, Result};
use clap::Parser;
use gbm_direction::export::{NativeTextFormat, OnnxGraph};
use gbm_direction::{DataLoader, FeatureEngineer, PipelineConfig};
use ndarray::ArrayView2;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Predict next-day direction with a trained model")]
struct Args {
    /// Price history CSV; the most recent complete row is scored
    #[arg(default_value = "data/stock_history.csv")]
    csv: PathBuf,

    /// Native text model
    #[arg(short, long, default_value = "model/lgb_stock_model.txt")]
    model: PathBuf,

    /// Also score the row with an exported ONNX graph
    #[arg(short, long)]
    graph: Option<PathBuf>,

    /// TOML configuration with the indicator windows used in training
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("gbm_direction={}", args.log_level)));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let config = match &args.config {
        Some(path) => PipelineConfig::from_toml(path)?,
        None => PipelineConfig::default(),
    };

    let model = NativeTextFormat::load(&args.model)?;
    info!(
        "Loaded {} trees over {} features from {}",
        model.num_iterations(),
        model.num_features(),
        args.model.display()
    );

    let bars = DataLoader::load_bars(&args.csv)?;
    let rows = FeatureEngineer::with_config(config.features).transform(&bars);
    let Some(latest) = rows.last() else {
        bail!(
            "{} has {} bars, not enough for a complete feature row",
            args.csv.display(),
            bars.len()
        );
    };

    let features = latest.features();
    // predict_proba rejects a dump whose width differs from the feature row
    let probability = model.predict_proba(ArrayView2::from_shape((1, features.len()), &features[..])?)?[0];

    println!("Date:           {}", latest.date());
    println!("Close:          {:.4}", latest.close());
    println!("Up probability: {:.4}", probability);
    if probability > 0.5 {
        println!("Prediction:     up tomorrow");
    } else {
        println!("Prediction:     down tomorrow");
    }

    if let Some(path) = &args.graph {
        let graph = OnnxGraph::load(path)?;
        let graph_probability = graph.predict_proba_row(&features)?;
        println!(
            "ONNX graph:     {:.4} (|diff| = {:.2e})",
            graph_probability,
            (graph_probability - probability).abs()
        );
    }

    Ok(())
}
