/*
cargo run --bin standardise_csv -- \
  --model-dir dataset/flux \
  --out evaluation/generated_csv/flux/img_paths_standard.csv

with extra column spellings:
cargo run --bin standardise_csv -- \
  --model-dir dataset/sd35 \
  --out /tmp/sd35_standard.csv \
  --column-aliases evaluation/column_aliases.json
*/

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, LevelFilter};

use cultural_eval::{
    columns::ColumnAliases,
    logging,
    standardise::{standardise_model_csv, ModelDataset, CANONICAL_FILE},
};

/// Rewrite one model's prompt-img-path.csv as the canonical step table.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Model directory containing prompt-img-path.csv
    #[arg(long)]
    model_dir: PathBuf,

    /// Output CSV (default: <model-dir>/img_paths_standard.csv)
    #[arg(long)]
    out: Option<PathBuf>,

    /// JSON file overriding the accepted column spellings
    #[arg(long, value_name = "PATH")]
    column_aliases: Option<PathBuf>,

    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_dir, "standardise_csv", LevelFilter::Info)?;

    let aliases = match &cli.column_aliases {
        Some(path) => ColumnAliases::from_json_file(path)?,
        None => ColumnAliases::default(),
    };
    let model = ModelDataset::new(cli.model_dir.clone());
    let out = cli
        .out
        .clone()
        .unwrap_or_else(|| cli.model_dir.join(CANONICAL_FILE));

    let res = standardise_model_csv(&model, &out, &aliases)
        .with_context(|| format!("Standardising model '{}'", model.name))?;
    info!("{}: schema {:?}", model.name, res.schema);

    println!("Prompt column   : {}", res.schema.prompt.header);
    println!(
        "Editing column  : {}",
        res.schema
            .editing_prompt
            .as_ref()
            .map_or("-", |c| c.header.as_str())
    );
    for (idx, col) in &res.schema.steps {
        println!("step{idx:<11}: {}", col.header);
    }
    println!("Rows            : {}", res.rows);
    println!("Standardised CSV ({} steps) → {}", res.max_step + 1, out.display());
    Ok(())
}
