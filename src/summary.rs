use std::{cmp::Ordering, collections::HashMap, fs, path::Path};

use anyhow::{Context, Result};
use csv::{ReaderBuilder, Writer};
use log::{info, warn};

use crate::standardise::is_missing;

/// Column tying all steps of one sample together.
pub const GROUP_COLUMN: &str = "group_id";
/// Column ranked to pick best/worst rows.
pub const SCORE_COLUMN: &str = "f1";
/// Columns coerced to numbers; anything unparseable becomes empty.
const NUMERIC_COLUMNS: [&str; 5] = ["accuracy", "precision", "recall", "f1", "num_questions"];

/// A metrics CSV held as text, rows padded to the header width.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl MetricTable {
    pub fn read(path: &Path) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("Opening {}", path.display()))?;
        let headers: Vec<String> = rdr
            .headers()
            .with_context(|| format!("Reading header of {}", path.display()))?
            .iter()
            .map(String::from)
            .collect();

        let mut rows = Vec::new();
        for rec in rdr.records() {
            let rec = rec.with_context(|| format!("Reading {}", path.display()))?;
            let mut row: Vec<String> = rec.iter().map(String::from).collect();
            row.resize(headers.len(), String::new());
            rows.push(row);
        }
        Ok(Self { headers, rows })
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

fn parse_score(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|v| !v.is_nan())
}

/// Best and worst row of one group, each without the group column.
#[derive(Debug, Clone, PartialEq)]
pub struct BestWorstRecord {
    pub group_id: String,
    pub best: Vec<String>,
    pub worst: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BestWorstSummary {
    /// source columns other than the group column, in source order
    pub fields: Vec<String>,
    pub records: Vec<BestWorstRecord>,
}

impl BestWorstSummary {
    /// `group_id, best_<field>..., worst_<field>...`
    pub fn header(&self) -> Vec<String> {
        let mut header = vec![GROUP_COLUMN.to_string()];
        header.extend(self.fields.iter().map(|f| format!("best_{f}")));
        header.extend(self.fields.iter().map(|f| format!("worst_{f}")));
        header
    }

    /// Value of `field` in the best (`best == true`) or worst row of a group.
    pub fn value(&self, group_id: &str, field: &str, best: bool) -> Option<&str> {
        let idx = self.fields.iter().position(|f| f == field)?;
        let rec = self.records.iter().find(|r| r.group_id == group_id)?;
        let row = if best { &rec.best } else { &rec.worst };
        row.get(idx).map(String::as_str)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut wtr =
            Writer::from_path(path).with_context(|| format!("Creating {}", path.display()))?;
        wtr.write_record(self.header())?;
        for rec in &self.records {
            let mut row: Vec<&str> = vec![&rec.group_id];
            row.extend(rec.best.iter().map(String::as_str));
            row.extend(rec.worst.iter().map(String::as_str));
            wtr.write_record(&row)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

/// Reduce a metrics table to one record per group: the row with the highest
/// f1 and the row with the lowest, first occurrence winning ties.
///
/// `None` means there is nothing to summarise (no rows, or no group / f1
/// column). Groups without a single numeric f1 are left out.
pub fn best_worst(table: &MetricTable) -> Option<BestWorstSummary> {
    if table.rows.is_empty() {
        return None;
    }
    let group_col = table.column(GROUP_COLUMN)?;
    let score_col = table.column(SCORE_COLUMN)?;

    let numeric: Vec<usize> = NUMERIC_COLUMNS
        .iter()
        .filter_map(|c| table.column(c))
        .collect();
    let coerced: Vec<Vec<String>> = table
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .map(|(i, cell)| {
                    if numeric.contains(&i) && parse_score(cell).is_none() {
                        String::new()
                    } else {
                        cell.clone()
                    }
                })
                .collect()
        })
        .collect();

    // group keys in first-seen order
    let mut order: Vec<String> = Vec::new();
    let mut members: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, row) in coerced.iter().enumerate() {
        let key = row[group_col].trim();
        if is_missing(key) {
            continue;
        }
        members
            .entry(key.to_string())
            .or_insert_with(|| {
                order.push(key.to_string());
                Vec::new()
            })
            .push(idx);
    }

    let strip_group = |row: &Vec<String>| -> Vec<String> {
        row.iter()
            .enumerate()
            .filter(|(i, _)| *i != group_col)
            .map(|(_, c)| c.clone())
            .collect()
    };

    let mut records = Vec::new();
    for key in order {
        let mut best: Option<(f64, usize)> = None;
        let mut worst: Option<(f64, usize)> = None;
        for &idx in &members[&key] {
            let Some(score) = parse_score(&coerced[idx][score_col]) else {
                continue;
            };
            if best.map_or(true, |(b, _)| score > b) {
                best = Some((score, idx));
            }
            if worst.map_or(true, |(w, _)| score < w) {
                worst = Some((score, idx));
            }
        }
        let (Some((_, best_idx)), Some((_, worst_idx))) = (best, worst) else {
            continue; // every f1 in this group is missing
        };
        records.push(BestWorstRecord {
            group_id: key,
            best: strip_group(&coerced[best_idx]),
            worst: strip_group(&coerced[worst_idx]),
        });
    }

    sort_by_group(&mut records);

    let fields = table
        .headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != group_col)
        .map(|(_, h)| h.clone())
        .collect();
    Some(BestWorstSummary { fields, records })
}

/// Numeric order when every id is a number, text order otherwise.
fn sort_by_group(records: &mut [BestWorstRecord]) {
    let all_numeric = records.iter().all(|r| parse_score(&r.group_id).is_some());
    if all_numeric {
        records.sort_by(|a, b| {
            let (x, y) = (parse_score(&a.group_id), parse_score(&b.group_id));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        });
    } else {
        records.sort_by(|a, b| a.group_id.cmp(&b.group_id));
    }
}

/// Summarise `input` into `output`. Returns the number of groups written, or
/// `None` when there was nothing to summarise and no file was written.
pub fn summarize_best_worst(input: &Path, output: &Path) -> Result<Option<usize>> {
    let table = MetricTable::read(input)?;
    let Some(summary) = best_worst(&table) else {
        warn!(
            "{}: no rows or no {GROUP_COLUMN}/{SCORE_COLUMN} column; best/worst skipped",
            input.display()
        );
        return Ok(None);
    };
    summary.write(output)?;
    info!(
        "Best/worst for {} groups -> {}",
        summary.records.len(),
        output.display()
    );
    Ok(Some(summary.records.len()))
}
