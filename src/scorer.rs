//! Command lines for the external scoring scripts.
//!
//! The scorers are opaque: they read the canonical CSV and write their own
//! CSVs. This module only builds their argument lists and waits for them.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::Command,
};

use itertools::Itertools;
use log::info;

use crate::error::ScorerError;

/// Script directories below the evaluation dir.
pub const GENERAL_METRIC_DIR: &str = "general_metric";
pub const CULTURAL_METRIC_DIR: &str = "cultural_metric";

pub const GENERAL_SCRIPT: &str = "multi_metric_evaluation.py";
pub const ENHANCED_CULTURAL_SCRIPT: &str = "enhanced_cultural_metric_pipeline.py";
pub const STANDARD_CULTURAL_SCRIPT: &str = "cultural_metric_pipeline.py";
pub const INDEX_SCRIPT: &str = "build_cultural_index.py";
/// File whose presence marks a built knowledge index.
pub const INDEX_FILE: &str = "faiss.index";

/// Launch `program args...` and block until it exits.
pub fn run_command(program: &str, args: &[OsString]) -> Result<(), ScorerError> {
    let command = printable(program, args);
    info!("  -> {command}");
    let status = Command::new(program)
        .args(args)
        .status()
        .map_err(|source| ScorerError::Spawn {
            command: command.clone(),
            source,
        })?;
    if status.success() {
        Ok(())
    } else {
        Err(ScorerError::Failed {
            command,
            status: status.to_string(),
        })
    }
}

fn printable(program: &str, args: &[OsString]) -> String {
    std::iter::once(program.to_string())
        .chain(args.iter().map(|a| a.to_string_lossy().into_owned()))
        .join(" ")
}

fn push_flag(args: &mut Vec<OsString>, flag: &str, on: bool) {
    if on {
        args.push(flag.into());
    }
}

fn push_opt(args: &mut Vec<OsString>, flag: &str, value: impl Into<OsString>) {
    args.push(flag.into());
    args.push(value.into());
}

/// Builder of the cultural knowledge index shared by all models.
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    pub python: String,
    pub script: PathBuf,
    pub pdf_dir: PathBuf,
    pub index_dir: PathBuf,
}

impl IndexBuilder {
    pub fn index_file(&self) -> PathBuf {
        self.index_dir.join(INDEX_FILE)
    }

    pub fn args(&self) -> Vec<OsString> {
        let mut args = vec![self.script.clone().into_os_string()];
        push_opt(&mut args, "--pdf-dir", &self.pdf_dir);
        push_opt(&mut args, "--out-dir", &self.index_dir);
        args
    }

    pub fn run(&self) -> Result<(), ScorerError> {
        run_command(&self.python, &self.args())
    }
}

/// CLIP / aesthetic / DreamSim scorer.
#[derive(Debug, Clone)]
pub struct GeneralScorer {
    pub python: String,
    pub script: PathBuf,
    pub clip_model: String,
    pub dreamsim_type: String,
    pub use_editing_prompt: bool,
}

impl GeneralScorer {
    pub fn args(&self, csv: &Path, out: &Path) -> Vec<OsString> {
        let mut args = vec![self.script.clone().into_os_string()];
        push_opt(&mut args, "--csv", csv);
        push_opt(&mut args, "--out", out);
        push_opt(&mut args, "--clip-model", &self.clip_model);
        push_opt(&mut args, "--dreamsim-type", &self.dreamsim_type);
        push_flag(&mut args, "--use-editing-prompt", self.use_editing_prompt);
        args
    }

    /// Writes `out` and its `_summary.csv` sibling.
    pub fn run(&self, csv: &Path, out: &Path) -> Result<(), ScorerError> {
        info!("[General] Running CLIP/Aesthetic/DreamSim on {}", csv.display());
        run_command(&self.python, &self.args(csv, out))
    }
}

/// Which cultural pipeline script to drive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CulturalMode {
    /// Checkpointing pipeline.
    Enhanced {
        resume: bool,
        batch_size: u32,
        save_frequency: u32,
        checkpoint_dir: PathBuf,
    },
    /// Legacy pipeline with per-column and rating switches.
    Standard {
        require_question_min: bool,
        enable_rating: bool,
        enable_vlm_selection: bool,
    },
}

/// RAG question generation + VLM judge.
#[derive(Debug, Clone)]
pub struct CulturalScorer {
    pub python: String,
    pub cultural_dir: PathBuf,
    pub question_model: String,
    pub vlm_model: String,
    pub max_questions: u32,
    pub min_questions: u32,
    pub min_negative: u32,
    pub top_k: u32,
    pub load_in_8bit: bool,
    pub load_in_4bit: bool,
    pub debug: bool,
    pub mode: CulturalMode,
}

/// Files for one cultural scoring run.
#[derive(Debug, Clone)]
pub struct CulturalJob<'a> {
    pub input_csv: &'a Path,
    pub image_root: &'a Path,
    pub summary_csv: &'a Path,
    pub detail_csv: &'a Path,
    pub index_dir: &'a Path,
    pub image_columns: &'a [String],
}

impl CulturalScorer {
    pub fn script(&self) -> PathBuf {
        self.cultural_dir.join(match self.mode {
            CulturalMode::Enhanced { .. } => ENHANCED_CULTURAL_SCRIPT,
            CulturalMode::Standard { .. } => STANDARD_CULTURAL_SCRIPT,
        })
    }

    pub fn args(&self, job: &CulturalJob) -> Vec<OsString> {
        let mut args = vec![self.script().into_os_string()];
        push_opt(&mut args, "--input-csv", job.input_csv);
        push_opt(&mut args, "--image-root", job.image_root);
        push_opt(&mut args, "--summary-csv", job.summary_csv);
        push_opt(&mut args, "--detail-csv", job.detail_csv);
        push_opt(&mut args, "--index-dir", job.index_dir);
        push_opt(&mut args, "--question-model", &self.question_model);
        push_opt(&mut args, "--vlm-model", &self.vlm_model);
        push_opt(&mut args, "--max-questions", self.max_questions.to_string());
        push_opt(&mut args, "--min-questions", self.min_questions.to_string());
        push_opt(&mut args, "--min-negative", self.min_negative.to_string());
        push_opt(&mut args, "--top-k", self.top_k.to_string());

        match &self.mode {
            CulturalMode::Enhanced {
                resume,
                batch_size,
                save_frequency,
                checkpoint_dir,
            } => {
                push_flag(&mut args, "--resume", *resume);
                push_opt(&mut args, "--batch-size", batch_size.to_string());
                push_opt(&mut args, "--save-frequency", save_frequency.to_string());
                push_opt(&mut args, "--checkpoint-dir", checkpoint_dir);
            }
            CulturalMode::Standard {
                require_question_min,
                enable_rating,
                enable_vlm_selection,
            } => {
                if !job.image_columns.is_empty() {
                    args.push("--image-columns".into());
                    args.extend(job.image_columns.iter().map(OsString::from));
                }
                push_flag(&mut args, "--require-question-minimum", *require_question_min);
                push_flag(&mut args, "--enable-rating", *enable_rating);
                push_flag(&mut args, "--enable-vlm-selection", *enable_vlm_selection);
            }
        }

        push_flag(&mut args, "--load-in-8bit", self.load_in_8bit);
        push_flag(&mut args, "--load-in-4bit", self.load_in_4bit);
        push_flag(&mut args, "--debug", self.debug);
        args
    }

    /// Writes `job.summary_csv` and `job.detail_csv`.
    pub fn run(&self, job: &CulturalJob) -> Result<(), ScorerError> {
        let label = match self.mode {
            CulturalMode::Enhanced { .. } => "Enhanced",
            CulturalMode::Standard { .. } => "Standard",
        };
        info!(
            "[Cultural] Running {label} RAG cultural metric on {}",
            job.input_csv.display()
        );
        run_command(&self.python, &self.args(job))
    }
}
