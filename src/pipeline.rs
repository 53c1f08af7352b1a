//! Per-model driver: standardise, score, summarise.
//!
//! Models run one after another in directory-name order. Each model's chain
//! ends in a [`ModelOutcome`]; a failing model does not stop the others unless
//! `fail_fast` is set.

use std::{
    fs::{self, File},
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use serde::Serialize;

use crate::{
    cache::{latest_general_metrics, summary_sibling, CacheDecision, CachePolicy},
    columns::ColumnAliases,
    error::ConfigError,
    logging,
    scorer::{
        CulturalJob, CulturalScorer, GeneralScorer, IndexBuilder, CULTURAL_METRIC_DIR,
        INDEX_SCRIPT,
    },
    standardise::{image_columns, standardise_model_csv, ModelDataset, Standardised, CANONICAL_FILE},
    summary::summarize_best_worst,
};

/// Directory under `cultural_metric/` holding the knowledge index.
const INDEX_DIR: &str = "vector_store";

/// Which cultural output feeds the best/worst summariser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BestWorstSource {
    Summary,
    Detail,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub dataset_root: PathBuf,
    /// PDFs the cultural knowledge index is built from
    pub external_data: PathBuf,
    /// Holds `general_metric/` and `cultural_metric/`
    pub evaluation_dir: PathBuf,
    pub outputs_dir: PathBuf,
    pub generated_csv_dir: PathBuf,
    /// Empty means every model directory
    pub models: Vec<String>,
    /// Suffix of every timestamped output file
    pub run_tag: String,
    pub aliases: ColumnAliases,
    pub python: String,
    /// `None` skips general scoring
    pub general: Option<GeneralScorer>,
    /// `None` skips cultural scoring and summarisation
    pub cultural: Option<CulturalScorer>,
    pub force: bool,
    pub reuse_latest_general: bool,
    pub rebuild_index: bool,
    pub vlm_selection: bool,
    pub best_worst_source: BestWorstSource,
    pub fail_fast: bool,
    pub show_progress: bool,
}

impl PipelineConfig {
    /// Standardisation only; scorers are switched on by filling
    /// `general` / `cultural`.
    pub fn new(
        dataset_root: PathBuf,
        evaluation_dir: PathBuf,
        outputs_dir: PathBuf,
        generated_csv_dir: PathBuf,
        run_tag: String,
    ) -> Self {
        Self {
            dataset_root,
            external_data: PathBuf::from("external_data"),
            evaluation_dir,
            outputs_dir,
            generated_csv_dir,
            models: Vec::new(),
            run_tag,
            aliases: ColumnAliases::default(),
            python: "python3".to_string(),
            general: None,
            cultural: None,
            force: false,
            reuse_latest_general: false,
            rebuild_index: false,
            vlm_selection: false,
            best_worst_source: BestWorstSource::Summary,
            fail_fast: false,
            show_progress: false,
        }
    }

    pub fn cultural_dir(&self) -> PathBuf {
        self.evaluation_dir.join(CULTURAL_METRIC_DIR)
    }

    pub fn index_dir(&self) -> PathBuf {
        self.cultural_dir().join(INDEX_DIR)
    }

    pub fn index_builder(&self) -> IndexBuilder {
        IndexBuilder {
            python: self.python.clone(),
            script: self.cultural_dir().join(INDEX_SCRIPT),
            pdf_dir: self.external_data.clone(),
            index_dir: self.index_dir(),
        }
    }
}

/// Furthest point a model's chain reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Discovered,
    Standardised,
    GeneralScored,
    CulturalScored,
    Summarised,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Completed,
    Failed,
}

/// An output file and whether it came from an earlier run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub path: PathBuf,
    pub reused: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelOutcome {
    pub model: String,
    pub stage: Stage,
    pub status: Status,
    pub error: Option<String>,
    pub max_step: Option<usize>,
    pub rows: Option<usize>,
    pub canonical_csv: Option<PathBuf>,
    pub general_metrics: Option<Artifact>,
    pub cultural_summary: Option<Artifact>,
    pub cultural_detail: Option<PathBuf>,
    pub best_worst: Option<PathBuf>,
    pub best_worst_groups: Option<usize>,
    pub vlm_best_worst: Option<PathBuf>,
}

impl ModelOutcome {
    fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            stage: Stage::Discovered,
            status: Status::Failed,
            error: None,
            max_step: None,
            rows: None,
            canonical_csv: None,
            general_metrics: None,
            cultural_summary: None,
            cultural_detail: None,
            best_worst: None,
            best_worst_groups: None,
            vlm_best_worst: None,
        }
    }

    fn standardised(&mut self, res: &Standardised) {
        self.stage = Stage::Standardised;
        self.max_step = Some(res.max_step);
        self.rows = Some(res.rows);
        self.canonical_csv = Some(res.output.clone());
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_tag: String,
    pub dataset_root: PathBuf,
    pub outcomes: Vec<ModelOutcome>,
}

impl RunReport {
    pub fn failed(&self) -> impl Iterator<Item = &ModelOutcome> {
        self.outcomes.iter().filter(|o| o.status == Status::Failed)
    }

    pub fn all_completed(&self) -> bool {
        self.failed().next().is_none()
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Creating {}", path.display()))?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}

/// Sub-directories of `root` in name order, restricted to `only` when given.
pub fn discover_models(root: &Path, only: &[String]) -> Result<Vec<ModelDataset>> {
    if !root.is_dir() {
        return Err(ConfigError::DatasetRootMissing(root.to_path_buf()).into());
    }
    let mut dirs = Vec::new();
    for entry in fs::read_dir(root).with_context(|| format!("Reading {}", root.display()))? {
        // follows symlinked model directories
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    let mut models: Vec<ModelDataset> = dirs.into_iter().map(ModelDataset::new).collect();

    if !only.is_empty() {
        models.retain(|m| only.contains(&m.name));
        let mut missing: Vec<String> = only
            .iter()
            .filter(|name| !models.iter().any(|m| &m.name == *name))
            .cloned()
            .collect();
        if !missing.is_empty() {
            missing.sort();
            missing.dedup();
            return Err(ConfigError::ModelsNotFound(missing).into());
        }
    }
    Ok(models)
}

/// Run every discovered model through the chain.
///
/// Errors returned here are run-level (configuration, shared index); model
/// failures are recorded in the report instead.
pub fn run(cfg: &PipelineConfig) -> Result<RunReport> {
    let models = discover_models(&cfg.dataset_root, &cfg.models)?;
    for dir in [&cfg.outputs_dir, &cfg.generated_csv_dir] {
        fs::create_dir_all(dir).map_err(|source| ConfigError::CreateDir {
            path: dir.clone(),
            source,
        })?;
    }
    if cfg.cultural.is_some() {
        ensure_index(cfg)?;
    }
    info!("{} model(s) to process, run tag {}", models.len(), cfg.run_tag);

    let bar = if cfg.show_progress {
        let bar = ProgressBar::new(models.len() as u64);
        bar.set_style(ProgressStyle::with_template(
            "{spinner:.green} {pos}/{len} {wide_bar:.cyan/blue} {elapsed_precise} {msg}",
        )?);
        logging::attach_progress(&bar);
        bar
    } else {
        ProgressBar::hidden()
    };

    let mut outcomes = Vec::with_capacity(models.len());
    for model in &models {
        bar.set_message(model.name.clone());
        let outcome = process_model(cfg, model);
        bar.inc(1);
        let failed = outcome.status == Status::Failed;
        outcomes.push(outcome);
        if failed && cfg.fail_fast {
            warn!("Stopping after failure of {} (fail-fast)", model.name);
            break;
        }
    }
    bar.finish_and_clear();
    logging::detach_progress();

    Ok(RunReport {
        run_tag: cfg.run_tag.clone(),
        dataset_root: cfg.dataset_root.clone(),
        outcomes,
    })
}

fn ensure_index(cfg: &PipelineConfig) -> Result<()> {
    let builder = cfg.index_builder();
    match CachePolicy::reuse_existing(cfg.rebuild_index).decide(&builder.index_file()) {
        CacheDecision::Reuse => {
            info!("[Index] Existing FAISS index found - skipping rebuild.");
        }
        CacheDecision::Recompute => {
            info!("[Index] Building cultural knowledge FAISS index...");
            builder.run().context("Building the cultural knowledge index")?;
        }
    }
    Ok(())
}

fn process_model(cfg: &PipelineConfig, model: &ModelDataset) -> ModelOutcome {
    let mut outcome = ModelOutcome::new(&model.name);
    match run_chain(cfg, model, &mut outcome) {
        Ok(()) => outcome.status = Status::Completed,
        Err(e) => {
            error!("{} failed after {:?}: {e:#}", model.name, outcome.stage);
            outcome.status = Status::Failed;
            outcome.error = Some(format!("{e:#}"));
        }
    }
    outcome
}

fn run_chain(cfg: &PipelineConfig, model: &ModelDataset, outcome: &mut ModelOutcome) -> Result<()> {
    info!("=== Preparing model: {} ===", model.name);
    let canonical = cfg.generated_csv_dir.join(&model.name).join(CANONICAL_FILE);
    let standardised = standardise_model_csv(model, &canonical, &cfg.aliases)?;
    info!(
        "[CSV] Standardised CSV written ({} steps): {}",
        standardised.max_step + 1,
        canonical.display()
    );
    outcome.standardised(&standardised);

    let out_dir = cfg.outputs_dir.join(&model.name);
    fs::create_dir_all(&out_dir).with_context(|| format!("Creating {}", out_dir.display()))?;

    if let Some(scorer) = &cfg.general {
        info!("[General] Processing model: {}", model.name);
        let metrics = general_stage(cfg, scorer, &canonical, &out_dir)?;
        outcome.general_metrics = Some(metrics);
        outcome.stage = Stage::GeneralScored;
    }

    if let Some(scorer) = &cfg.cultural {
        info!("[Cultural] Processing model: {}", model.name);
        cultural_stage(cfg, scorer, &standardised, &out_dir, outcome)?;
    }
    Ok(())
}

fn general_stage(
    cfg: &PipelineConfig,
    scorer: &GeneralScorer,
    canonical: &Path,
    out_dir: &Path,
) -> Result<Artifact> {
    let latest = if cfg.reuse_latest_general && !cfg.force {
        latest_general_metrics(out_dir)?
    } else {
        None
    };

    // a reused file counts as present only once its summary exists too
    let (target, marker, policy) = match latest {
        Some(path) => {
            info!("  Reusing {}", path.display());
            let marker = summary_sibling(&path);
            (path, marker, CachePolicy::reuse_existing(false))
        }
        None => {
            let path = out_dir.join(format!("general_metrics_{}.csv", cfg.run_tag));
            (path.clone(), path, CachePolicy::reuse_existing(cfg.force))
        }
    };

    if policy.decide(&marker) == CacheDecision::Reuse {
        info!(
            "  Existing metrics found ({}); skip (use --force to recompute).",
            target.display()
        );
        return Ok(Artifact {
            path: target,
            reused: true,
        });
    }

    scorer
        .run(canonical, &target)
        .with_context(|| format!("General scorer on {}", canonical.display()))?;
    let summary = summary_sibling(&target);
    if summary.exists() {
        info!("  Summary saved to {}", summary.display());
    } else {
        warn!("  General scorer wrote no {}", summary.display());
    }
    Ok(Artifact {
        path: target,
        reused: false,
    })
}

fn cultural_stage(
    cfg: &PipelineConfig,
    scorer: &CulturalScorer,
    standardised: &Standardised,
    out_dir: &Path,
    outcome: &mut ModelOutcome,
) -> Result<()> {
    let tag = &cfg.run_tag;
    let summary = out_dir.join(format!("cultural_metrics_{tag}_summary.csv"));
    let detail = out_dir.join(format!("cultural_metrics_{tag}_detail.csv"));
    let best_worst = out_dir.join(format!("cultural_best_worst_{tag}.csv"));

    let reused = match CachePolicy::reuse_existing(cfg.force).decide(&summary) {
        CacheDecision::Reuse => {
            info!(
                "  Existing metrics found ({}); skip (use --force to recompute).",
                summary.display()
            );
            true
        }
        CacheDecision::Recompute => {
            let columns = image_columns(standardised.max_step);
            let index_dir = cfg.index_dir();
            let job = CulturalJob {
                input_csv: &standardised.output,
                image_root: &cfg.dataset_root,
                summary_csv: &summary,
                detail_csv: &detail,
                index_dir: &index_dir,
                image_columns: &columns,
            };
            scorer
                .run(&job)
                .with_context(|| format!("Cultural scorer on {}", standardised.output.display()))?;
            info!("  Summary saved to {}", summary.display());
            info!("  Detail saved to {}", detail.display());
            false
        }
    };
    outcome.cultural_summary = Some(Artifact {
        path: summary.clone(),
        reused,
    });
    if detail.exists() {
        outcome.cultural_detail = Some(detail.clone());
    }
    outcome.stage = Stage::CulturalScored;

    let source = match cfg.best_worst_source {
        BestWorstSource::Summary => &summary,
        BestWorstSource::Detail => &detail,
    };
    if !source.is_file() {
        bail!("cultural scorer produced no {}", source.display());
    }
    if let Some(groups) = summarize_best_worst(source, &best_worst)? {
        info!("  Best/Worst saved to {}", best_worst.display());
        outcome.best_worst = Some(best_worst);
        outcome.best_worst_groups = Some(groups);
    }
    outcome.stage = Stage::Summarised;

    if cfg.vlm_selection {
        let stem = summary
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let vlm = summary.with_file_name(format!("{stem}_vlm_best_worst.csv"));
        if vlm.exists() {
            info!("  VLM Best/Worst saved to {}", vlm.display());
            outcome.vlm_best_worst = Some(vlm);
        }
    }
    Ok(())
}
