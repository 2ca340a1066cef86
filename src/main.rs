//! Train the next-day direction classifier and export it
//!
//! Usage: cargo run --release -- data/stock_history.csv --output-dir model

use anyhow::Result;
use clap::Parser;
use gbm_direction::{Pipeline, PipelineConfig};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Train a GBM next-day direction classifier")]
struct Args {
    /// Price history CSV with Date, Open, High, Low, Close, Volume columns
    csv: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for the exported artifacts
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Share of labeled rows held out at the end of the series
    #[arg(long)]
    test_fraction: Option<f64>,

    /// Number of boosting rounds
    #[arg(long)]
    rounds: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("gbm_direction={}", args.log_level)));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            PipelineConfig::from_toml(path)?
        }
        None => PipelineConfig::default(),
    };
    if let Some(csv) = args.csv {
        config.data.csv_path = csv;
    }
    if let Some(dir) = args.output_dir {
        config.export.output_dir = dir;
    }
    if let Some(fraction) = args.test_fraction {
        config.split.test_fraction = fraction;
    }
    if let Some(rounds) = args.rounds {
        config.training.num_boost_round = rounds;
    }

    println!("{}", "=".repeat(60));
    println!("  GBM Next-Day Direction Classifier");
    println!("  Input: {}", config.data.csv_path.display());
    println!("{}\n", "=".repeat(60));

    let report = Pipeline::new(config)?.run()?;

    println!("Data:");
    println!("   Bars loaded:       {}", report.n_bars);
    println!("   Feature rows:      {}", report.n_feature_rows);
    println!("   Labeled examples:  {}", report.n_labeled);
    if let (Some((train_start, train_end)), Some((test_start, test_end))) =
        (report.train_range, report.test_range)
    {
        println!("   Train: {} samples ({} to {})", report.n_train, train_start, train_end);
        println!("   Test:  {} samples ({} to {})", report.n_test, test_start, test_end);
    }

    println!("\nModel:");
    println!("   Trees:         {}", report.model.num_iterations());
    println!("   Learning rate: {}", report.model.learning_rate);
    if let Some(last) = report.model.valid_history.last() {
        println!("   Final valid {}: {:.4}", report.model.metric, last);
    }

    println!("\nTest set:");
    println!("   Accuracy:     {:.4}", report.metrics.accuracy);
    println!("   Binary error: {:.4}", report.metrics.binary_error);
    println!("   Log loss:     {:.4}", report.metrics.log_loss);
    println!("   Up days:      {:.1}%", report.metrics.positive_rate * 100.0);

    println!("\nArtifacts:");
    for path in &report.artifacts {
        println!("   {}", path.display());
    }

    Ok(())
}
