/*
All models, defaults (dataset/, evaluation/outputs/, evaluation/generated_csv/):
cargo run --release --bin run_all_metrics

Two models, cultural metric only, 4-bit VLM:
cargo run --release --bin run_all_metrics -- \
  --models flux qwen \
  --skip-general \
  --load-in-4bit \
  --cultural-vlm-selection

Re-use the newest general metrics, recompute nothing that already exists:
cargo run --release --bin run_all_metrics -- \
  --reuse-latest-general \
  --run-tag 20250918_101500
*/

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use log::{info, LevelFilter};

use cultural_eval::{
    columns::ColumnAliases,
    logging,
    pipeline::{self, BestWorstSource, PipelineConfig, Status},
    scorer::{CulturalMode, CulturalScorer, GeneralScorer, GENERAL_METRIC_DIR, GENERAL_SCRIPT},
};

/// Run general and cultural metrics for every model under the dataset root.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// One sub-directory per model, each with a prompt-img-path.csv
    #[arg(long, default_value = "dataset")]
    dataset_root: PathBuf,

    /// PDFs the cultural knowledge index is built from
    #[arg(long, default_value = "external_data")]
    external_data: PathBuf,

    /// Directory holding general_metric/ and cultural_metric/ scripts
    #[arg(long, default_value = "evaluation")]
    evaluation_dir: PathBuf,

    #[arg(long, default_value = "evaluation/outputs")]
    outputs_dir: PathBuf,

    #[arg(long, default_value = "evaluation/generated_csv")]
    generated_csv_dir: PathBuf,

    /// Subset of model folder names to evaluate
    #[arg(long, num_args = 1..)]
    models: Vec<String>,

    /// Skip CLIP/Aesthetic/DreamSim evaluation
    #[arg(long)]
    skip_general: bool,

    /// Skip cultural metric evaluation
    #[arg(long)]
    skip_cultural: bool,

    #[arg(long, default_value = "ViT-L/14")]
    clip_model: String,

    #[arg(long, default_value = "ensemble")]
    dreamsim_type: String,

    /// Use the base prompt instead of the editing prompt for CLIP
    #[arg(long)]
    disable_editing_prompt: bool,

    #[arg(long, default_value = "Qwen/Qwen2.5-0.5B-Instruct")]
    question_model: String,

    #[arg(long, default_value = "Qwen/Qwen2-VL-7B-Instruct")]
    vlm_model: String,

    #[arg(long, default_value_t = 8)]
    max_questions: u32,

    #[arg(long, default_value_t = 4)]
    min_questions: u32,

    #[arg(long, default_value_t = 0)]
    min_negative: u32,

    #[arg(long, default_value_t = 8)]
    top_k: u32,

    #[arg(long)]
    load_in_8bit: bool,

    #[arg(long)]
    load_in_4bit: bool,

    /// Print cultural metric debugging info
    #[arg(long)]
    cultural_debug: bool,

    /// Enforce question minimums (standard cultural pipeline)
    #[arg(long)]
    cultural_strict_question_min: bool,

    /// Request cultural representation and prompt alignment scores (standard pipeline)
    #[arg(long)]
    cultural_rating: bool,

    /// Ask the VLM to choose the best/worst image per group
    #[arg(long)]
    cultural_vlm_selection: bool,

    /// Reuse the newest existing general metrics if present
    #[arg(long)]
    reuse_latest_general: bool,

    /// Rebuild the cultural knowledge index even if it exists
    #[arg(long)]
    rebuild_index: bool,

    /// Recompute even if outputs already exist
    #[arg(long)]
    force: bool,

    /// Use the legacy cultural pipeline instead of the enhanced one
    #[arg(long)]
    standard_cultural: bool,

    /// Disable checkpoint resumption (enhanced pipeline)
    #[arg(long)]
    no_resume: bool,

    #[arg(long, default_value_t = 1)]
    batch_size: u32,

    #[arg(long, default_value_t = 5)]
    save_frequency: u32,

    /// Interpreter that runs the scorer scripts
    #[arg(long, default_value = "python3")]
    python: String,

    /// Suffix for output files (default: current timestamp)
    #[arg(long)]
    run_tag: Option<String>,

    /// JSON file overriding the accepted column spellings
    #[arg(long, value_name = "PATH")]
    column_aliases: Option<PathBuf>,

    /// Cultural output fed to the best/worst summary
    #[arg(long, value_enum, default_value_t = BestWorstSource::Summary)]
    best_worst_source: BestWorstSource,

    /// Stop at the first model that fails
    #[arg(long)]
    fail_fast: bool,

    #[arg(long)]
    no_progress: bool,

    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
}

impl Cli {
    fn into_config(self) -> Result<PipelineConfig> {
        let run_tag = self
            .run_tag
            .clone()
            .unwrap_or_else(|| Local::now().format("%Y%m%d_%H%M%S").to_string());

        let mut cfg = PipelineConfig::new(
            self.dataset_root.clone(),
            self.evaluation_dir.clone(),
            self.outputs_dir.clone(),
            self.generated_csv_dir.clone(),
            run_tag,
        );
        cfg.external_data = self.external_data.clone();
        cfg.models = self.models.clone();
        cfg.python = self.python.clone();
        cfg.force = self.force;
        cfg.reuse_latest_general = self.reuse_latest_general;
        cfg.rebuild_index = self.rebuild_index;
        cfg.vlm_selection = self.cultural_vlm_selection;
        cfg.best_worst_source = self.best_worst_source;
        cfg.fail_fast = self.fail_fast;
        cfg.show_progress = !self.no_progress;

        if let Some(path) = &self.column_aliases {
            cfg.aliases = ColumnAliases::from_json_file(path)?;
        }

        if !self.skip_general {
            cfg.general = Some(GeneralScorer {
                python: self.python.clone(),
                script: self
                    .evaluation_dir
                    .join(GENERAL_METRIC_DIR)
                    .join(GENERAL_SCRIPT),
                clip_model: self.clip_model.clone(),
                dreamsim_type: self.dreamsim_type.clone(),
                use_editing_prompt: !self.disable_editing_prompt,
            });
        }

        if !self.skip_cultural {
            let cultural_dir = cfg.cultural_dir();
            let mode = if self.standard_cultural {
                CulturalMode::Standard {
                    require_question_min: self.cultural_strict_question_min,
                    enable_rating: self.cultural_rating,
                    enable_vlm_selection: self.cultural_vlm_selection,
                }
            } else {
                CulturalMode::Enhanced {
                    resume: !self.no_resume,
                    batch_size: self.batch_size,
                    save_frequency: self.save_frequency,
                    checkpoint_dir: cultural_dir.join("checkpoints"),
                }
            };
            cfg.cultural = Some(CulturalScorer {
                python: self.python,
                cultural_dir,
                question_model: self.question_model,
                vlm_model: self.vlm_model,
                max_questions: self.max_questions,
                min_questions: self.min_questions,
                min_negative: self.min_negative,
                top_k: self.top_k,
                load_in_8bit: self.load_in_8bit,
                load_in_4bit: self.load_in_4bit,
                debug: self.cultural_debug,
                mode,
            });
        }
        Ok(cfg)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_path = logging::init(&cli.log_dir, "run_all_metrics", LevelFilter::Info)?;
    info!("Started with {:?}", cli);

    let cfg = cli.into_config()?;
    let report = pipeline::run(&cfg)?;

    let report_path = cfg
        .outputs_dir
        .join(format!("run_report_{}.json", report.run_tag));
    report
        .write_json(&report_path)
        .with_context(|| "Cannot write run report")?;

    println!("\n=== Evaluation summary ({}) ===", report.run_tag);
    println!("{:<20} {:<10} {:<16} {}", "model", "status", "stage", "detail");
    println!("{:-<20} {:-<10} {:-<16} {:-<6}", "", "", "", "");
    for o in &report.outcomes {
        let status = match o.status {
            Status::Completed => "ok",
            Status::Failed => "FAILED",
        };
        let detail = match (&o.error, &o.best_worst) {
            (Some(err), _) => err.clone(),
            (None, Some(path)) => format!("best/worst -> {}", path.display()),
            (None, None) => o
                .canonical_csv
                .as_ref()
                .map(|p| format!("csv -> {}", p.display()))
                .unwrap_or_default(),
        };
        println!(
            "{:<20} {:<10} {:<16} {}",
            o.model,
            status,
            format!("{:?}", o.stage),
            detail
        );
    }
    println!("\nRun report : {}", report_path.display());
    println!("Log file   : {}", log_path.display());

    if !report.all_completed() {
        for o in report.failed() {
            eprintln!(
                "model '{}' failed: {}",
                o.model,
                o.error.as_deref().unwrap_or("unknown error")
            );
        }
        std::process::exit(1);
    }
    println!("\nAll evaluations completed.");
    Ok(())
}
