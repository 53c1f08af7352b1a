use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use csv::{ReaderBuilder, StringRecord, Writer};
use log::{info, warn};
use serde::Serialize;

use crate::{
    columns::{find_column, ColumnAliases},
    error::StandardiseError,
    paths::resolve_path,
};

/// Raw metadata file expected inside every model directory.
pub const SOURCE_FILE: &str = "prompt-img-path.csv";
/// Name of the canonical table written per model.
pub const CANONICAL_FILE: &str = "img_paths_standard.csv";

/// Cell values read as "missing" (the pandas default NA set).
const NA_TOKENS: [&str; 19] = [
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

pub fn is_missing(cell: &str) -> bool {
    NA_TOKENS.contains(&cell.trim())
}

/// One discovered model directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDataset {
    pub name: String,
    pub dir: PathBuf,
}

impl ModelDataset {
    pub fn new(dir: PathBuf) -> Self {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { name, dir }
    }

    pub fn source_csv(&self) -> PathBuf {
        self.dir.join(SOURCE_FILE)
    }
}

/// A header found in the raw CSV and its position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub index: usize,
    pub header: String,
}

/// Where each logical field lives in a raw metadata CSV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawSchema {
    pub prompt: Column,
    pub editing_prompt: Option<Column>,
    /// step index -> column; gaps are allowed
    pub steps: BTreeMap<usize, Column>,
}

impl RawSchema {
    pub fn detect(
        headers: &StringRecord,
        aliases: &ColumnAliases,
        source: &Path,
    ) -> Result<Self, StandardiseError> {
        let names: Vec<&str> = headers.iter().collect();
        let column = |candidates: &[String]| {
            find_column(&names, candidates).map(|index| Column {
                index,
                header: names[index].to_string(),
            })
        };

        let prompt = column(&aliases.prompt)
            .ok_or_else(|| StandardiseError::NoPromptColumn(source.to_path_buf()))?;
        let editing_prompt = column(&aliases.editing_prompt);

        let steps: BTreeMap<usize, Column> = (0..=aliases.max_step)
            .filter_map(|idx| column(&aliases.step_candidates(idx)).map(|c| (idx, c)))
            .collect();
        if steps.is_empty() {
            return Err(StandardiseError::NoStepColumns(source.to_path_buf()));
        }

        Ok(Self {
            prompt,
            editing_prompt,
            steps,
        })
    }

    /// Highest step index present. Never panics: detection rejects empty maps.
    pub fn max_step(&self) -> usize {
        self.steps.keys().next_back().copied().unwrap_or(0)
    }
}

/// One generation sample in canonical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRow {
    pub prompt: String,
    pub editing_prompt: String,
    /// absolute path per step, empty when the step has no image
    pub steps: Vec<String>,
}

impl CanonicalRow {
    fn from_record(
        record: &StringRecord,
        schema: &RawSchema,
        base_dir: &Path,
    ) -> std::io::Result<Self> {
        let cell = |c: &Column| record.get(c.index).unwrap_or("");

        let prompt_cell = cell(&schema.prompt);
        let prompt = if is_missing(prompt_cell) {
            String::new()
        } else {
            prompt_cell.trim().to_string()
        };
        let editing_prompt = schema
            .editing_prompt
            .as_ref()
            .map(cell)
            .filter(|v| !is_missing(v))
            .map(|v| v.trim().to_string())
            .unwrap_or_default();

        let steps = (0..=schema.max_step())
            .map(|idx| match schema.steps.get(&idx).map(cell) {
                Some(v) if !is_missing(v) => resolve_path(base_dir, v),
                _ => Ok(String::new()),
            })
            .collect::<std::io::Result<Vec<_>>>()?;

        Ok(Self {
            prompt,
            editing_prompt,
            steps,
        })
    }
}

/// `prompt, editing_prompt, step0_path, ..., step{max_step}_path`
pub fn canonical_header(max_step: usize) -> Vec<String> {
    let mut header = vec!["prompt".to_string(), "editing_prompt".to_string()];
    header.extend((0..=max_step).map(|idx| format!("step{idx}_path")));
    header
}

/// Column names of the image columns in the canonical table.
pub fn image_columns(max_step: usize) -> Vec<String> {
    (0..=max_step).map(|idx| format!("step{idx}_path")).collect()
}

/// What a successful standardisation produced.
#[derive(Debug, Clone, Serialize)]
pub struct Standardised {
    pub schema: RawSchema,
    pub max_step: usize,
    pub rows: usize,
    pub output: PathBuf,
}

/// Read `<model>/prompt-img-path.csv`, rewrite it as the canonical table at
/// `output_csv` (overwriting) and report the detected schema.
pub fn standardise_model_csv(
    model: &ModelDataset,
    output_csv: &Path,
    aliases: &ColumnAliases,
) -> Result<Standardised, StandardiseError> {
    let source = model.source_csv();
    if !source.is_file() {
        return Err(StandardiseError::SourceMissing {
            model: model.name.clone(),
            path: source,
        });
    }
    let csv_err = |source_err: csv::Error| StandardiseError::Csv {
        path: source.clone(),
        source: source_err,
    };

    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .from_path(&source)
        .map_err(csv_err)?;
    let headers = rdr.headers().map_err(csv_err)?.clone();
    if headers.is_empty() {
        return Err(StandardiseError::EmptySource(source));
    }
    let records = rdr
        .records()
        .collect::<Result<Vec<StringRecord>, _>>()
        .map_err(csv_err)?;
    if records.is_empty() {
        return Err(StandardiseError::EmptySource(source));
    }

    let schema = RawSchema::detect(&headers, aliases, &source)?;
    let max_step = schema.max_step();
    info!(
        "{}: prompt column {:?}, editing column {:?}, steps {:?}",
        model.name,
        schema.prompt.header,
        schema.editing_prompt.as_ref().map(|c| &c.header),
        schema.steps.keys().collect::<Vec<_>>()
    );

    let rows = records
        .iter()
        .map(|rec| CanonicalRow::from_record(rec, &schema, &model.dir))
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| StandardiseError::Io {
            path: source.clone(),
            source: e,
        })?;

    let blank_prompts = rows.iter().filter(|r| r.prompt.is_empty()).count();
    if blank_prompts > 0 {
        warn!(
            "{}: {blank_prompts} row(s) have an empty prompt cell",
            model.name
        );
    }

    write_canonical(output_csv, max_step, &rows)?;
    info!("{}: wrote {} rows -> {:?}", model.name, rows.len(), output_csv);

    Ok(Standardised {
        schema,
        max_step,
        rows: rows.len(),
        output: output_csv.to_path_buf(),
    })
}

fn write_canonical(
    output_csv: &Path,
    max_step: usize,
    rows: &[CanonicalRow],
) -> Result<(), StandardiseError> {
    let io_err = |e| StandardiseError::Io {
        path: output_csv.to_path_buf(),
        source: e,
    };
    let csv_err = |e| StandardiseError::Csv {
        path: output_csv.to_path_buf(),
        source: e,
    };

    if let Some(parent) = output_csv.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let mut wtr = Writer::from_path(output_csv).map_err(csv_err)?;
    wtr.write_record(canonical_header(max_step)).map_err(csv_err)?;
    for row in rows {
        let mut record: Vec<&str> = vec![&row.prompt, &row.editing_prompt];
        record.extend(row.steps.iter().map(String::as_str));
        wtr.write_record(&record).map_err(csv_err)?;
    }
    wtr.flush().map_err(io_err)?;
    Ok(())
}
