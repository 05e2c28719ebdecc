//! CSV persistence for the working table.
//!
//! Every tabular artifact (mapped matches, per-video classifications,
//! checkpoints, merged review files) shares the `MatchRow` layout.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::types::MatchRow;

pub fn read_rows(path: &Path) -> Result<Vec<MatchRow>> {
    let mut reader = csv::Reader::from_path(path).with_context(|| format!("opening {}", path.display()))?;
    let mut rows = Vec::new();
    for (i, row) in reader.deserialize::<MatchRow>().enumerate() {
        rows.push(row.with_context(|| format!("{}: row {}", path.display(), i + 1))?);
    }
    Ok(rows)
}

/// Writes rows to `path` through a sibling temp file and a rename, so a
/// reader never observes a half-written table.
pub fn write_rows<'a, I>(path: &Path, rows: I) -> Result<usize>
where
    I: IntoIterator<Item = &'a MatchRow>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let tmp = temp_sibling(path);
    let mut count = 0usize;
    {
        let mut writer = csv::Writer::from_path(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
        for row in rows {
            writer.serialize(row)?;
            count += 1;
        }
        writer.flush()?;
    }
    fs::rename(&tmp, path).with_context(|| format!("renaming {} -> {}", tmp.display(), path.display()))?;
    Ok(count)
}

/// `<name>.partial` next to `path`; renamed over `path` once complete.
pub fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}
