use std::{fs, path::Path};

use serde::Deserialize;

use crate::error::ConfigError;

/// Placeholder replaced by the step index in step column templates.
const STEP_PLACEHOLDER: &str = "{n}";

/// Accepted header spellings for every logical column of a raw metadata CSV.
///
/// All lists are ordered by priority. Any field omitted from a JSON alias file
/// keeps its default.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ColumnAliases {
    pub prompt: Vec<String>,
    pub editing_prompt: Vec<String>,
    /// Spellings of the step 0 (base image) column.
    pub base_step: Vec<String>,
    /// Spellings of step 1..=max_step, with `{n}` standing for the index.
    pub edit_step: Vec<String>,
    pub max_step: usize,
}

impl Default for ColumnAliases {
    fn default() -> Self {
        fn owned(list: &[&str]) -> Vec<String> {
            list.iter().map(|s| s.to_string()).collect()
        }
        Self {
            prompt: owned(&["prompt", "t2i prompt", "text", "text_prompt"]),
            editing_prompt: owned(&["editing_prompt", "i2i prompt", "instruction"]),
            base_step: owned(&["step0", "step0_path", "base", "base_path"]),
            edit_step: owned(&[
                "step{n}",
                "step{n}_path",
                "edit_{n}",
                "edit_{n}_path",
                "edit{n}",
                "edit{n}_path",
            ]),
            max_step: 9,
        }
    }
}

impl ColumnAliases {
    /// Load an alias table from JSON, falling back to defaults per field.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::AliasTable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|e| ConfigError::AliasTable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Candidate spellings for the column holding step `idx`.
    pub fn step_candidates(&self, idx: usize) -> Vec<String> {
        if idx == 0 {
            return self.base_step.clone();
        }
        let n = idx.to_string();
        self.edit_step
            .iter()
            .map(|tpl| tpl.replace(STEP_PLACEHOLDER, &n))
            .collect()
    }
}

fn fold(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Index of the header matching the highest-priority candidate.
///
/// Matching is exact after trimming and lower-casing both sides. When several
/// headers fold to the same candidate the leftmost one wins.
pub fn find_column<H, C>(headers: &[H], candidates: &[C]) -> Option<usize>
where
    H: AsRef<str>,
    C: AsRef<str>,
{
    let folded: Vec<String> = headers.iter().map(|h| fold(h.as_ref())).collect();
    candidates.iter().find_map(|cand| {
        let key = fold(cand.as_ref());
        folded.iter().position(|h| *h == key)
    })
}
