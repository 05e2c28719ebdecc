//! Merge of classified tables into the review files.
//!
//! All inputs are concatenated in order into the merged file, which is then
//! split into rows labeled `No Class` and everything else (unlabeled rows go
//! with the classified ones).

use anyhow::{ensure, Context, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use cardlink_core::error::Error;
use cardlink_core::table::{read_rows, write_rows};
use cardlink_core::types::{ClassificationLabel, MatchRow};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub inputs: usize,
    pub total: usize,
    pub no_class: usize,
    pub with_class: usize,
}

/// Expands directories to their `classified_*.csv` files (sorted) and keeps
/// CSV files as given. Other files are skipped with a warning.
pub fn collect_inputs(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for path in paths {
        if !path.exists() {
            return Err(Error::NotFound(format!("merge input {}", path.display())).into());
        }
        if path.is_dir() {
            let mut found: Vec<PathBuf> = walkdir::WalkDir::new(path)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .filter(|p| is_artifact(p))
                .collect();
            found.sort();
            out.extend(found);
        } else if has_csv_extension(path) {
            out.push(path.clone());
        } else {
            warn!(path = %path.display(), "skipping unsupported file format");
        }
    }
    Ok(out)
}

fn has_csv_extension(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()).map(|e| e.eq_ignore_ascii_case("csv")).unwrap_or(false)
}

fn is_artifact(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    name.starts_with("classified_") && has_csv_extension(path)
}

pub fn merge_outputs(inputs: &[PathBuf], merged: &Path, no_class: &Path, with_class: &Path) -> Result<MergeSummary> {
    ensure!(!inputs.is_empty(), "no classified files to merge");
    let mut rows: Vec<MatchRow> = Vec::new();
    for input in inputs {
        let batch = read_rows(input).with_context(|| format!("reading {}", input.display()))?;
        info!(path = %input.display(), rows = batch.len(), "read classified file");
        rows.extend(batch);
    }
    let is_no_class = |r: &&MatchRow| r.classification == Some(ClassificationLabel::NoClass);

    let total = write_rows(merged, rows.iter())?;
    let no_class_count = write_rows(no_class, rows.iter().filter(is_no_class))?;
    let with_class_count = write_rows(with_class, rows.iter().filter(|r| !is_no_class(r)))?;

    let summary = MergeSummary { inputs: inputs.len(), total, no_class: no_class_count, with_class: with_class_count };
    info!(
        inputs = summary.inputs,
        total = summary.total,
        no_class = summary.no_class,
        with_class = summary.with_class,
        "merged classified files"
    );
    Ok(summary)
}
