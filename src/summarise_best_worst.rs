/*
cargo run --bin summarise_best_worst -- \
  --input  evaluation/outputs/flux/cultural_metrics_20250918_101500_summary.csv \
  --output evaluation/outputs/flux/cultural_best_worst_20250918_101500.csv
*/

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use log::LevelFilter;

use cultural_eval::{logging, summary::summarize_best_worst};

/// Pick the highest- and lowest-f1 row of every group in a metrics CSV.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Metrics CSV with group_id and f1 columns
    #[arg(long)]
    input: PathBuf,

    /// Where to write the best/worst CSV
    #[arg(long)]
    output: PathBuf,

    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if !cli.input.is_file() {
        bail!("{} is not a file", cli.input.display());
    }
    logging::init(&cli.log_dir, "summarise_best_worst", LevelFilter::Info)?;

    match summarize_best_worst(&cli.input, &cli.output)? {
        Some(groups) => println!("Best/worst for {groups} groups → {}", cli.output.display()),
        None => println!("Nothing to summarise in {}", cli.input.display()),
    }
    Ok(())
}
