use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use itertools::Itertools;
use regex::Regex;

/// Whether an existing output may stand in for a fresh computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub force: bool,
    pub reuse: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDecision {
    Reuse,
    Recompute,
}

impl CachePolicy {
    /// Existing outputs are reused unless recomputation is forced.
    pub fn reuse_existing(force: bool) -> Self {
        Self { force, reuse: true }
    }

    pub fn decide(&self, output: &Path) -> CacheDecision {
        self.decide_with(output.exists())
    }

    pub fn decide_with(&self, output_exists: bool) -> CacheDecision {
        if output_exists && self.reuse && !self.force {
            CacheDecision::Reuse
        } else {
            CacheDecision::Recompute
        }
    }
}

/// `<stem>_summary.csv` next to a metrics CSV.
pub fn summary_sibling(metrics_csv: &Path) -> PathBuf {
    let stem = metrics_csv
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    metrics_csv.with_file_name(format!("{stem}_summary.csv"))
}

/// Newest `general_metrics_<tag>.csv` in `dir` (last by name), ignoring the
/// `_summary.csv` companions.
pub fn latest_general_metrics(dir: &Path) -> Result<Option<PathBuf>> {
    if !dir.is_dir() {
        return Ok(None);
    }
    let re = Regex::new(r"^general_metrics_.+\.csv$")?;
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Reading {}", dir.display()))? {
        let entry = entry?;
        if !entry.path().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if re.is_match(&name) && !name.ends_with("_summary.csv") {
            names.push(name);
        }
    }
    Ok(names.into_iter().sorted().last().map(|n| dir.join(n)))
}
