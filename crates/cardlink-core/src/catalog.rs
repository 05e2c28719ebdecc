//! Loaders for the linked transcript catalog and the flashcard deck.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::types::{FlashcardSource, TranscriptRecord};

/// Loads transcript records from a JSON array file, or from every `.json`
/// file under a directory (sorted by path).
pub fn load_catalog(path: &Path) -> Result<Vec<TranscriptRecord>> {
    if !path.exists() {
        return Err(Error::NotFound(format!("catalog {}", path.display())).into());
    }
    let files = if path.is_dir() { list_json_files(path) } else { vec![path.to_path_buf()] };
    let mut records = Vec::new();
    for file in &files {
        let content = fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
        let batch: Vec<TranscriptRecord> = serde_json::from_str(&content).map_err(|e| Error::MalformedInput {
            path: file.display().to_string(),
            reason: e.to_string(),
        })?;
        debug!(file = %file.display(), records = batch.len(), "loaded catalog file");
        records.extend(batch);
    }
    info!(files = files.len(), records = records.len(), "loaded transcript catalog");
    Ok(records)
}

/// Maps cadmore id to transcript text. Later duplicates win, matching a
/// plain dictionary build over the export.
pub fn transcript_map(records: &[TranscriptRecord]) -> HashMap<String, String> {
    let mut map = HashMap::with_capacity(records.len());
    for r in records {
        if r.cadmore_id.is_empty() {
            continue;
        }
        map.insert(r.cadmore_id.clone(), r.transcript_text.clone());
    }
    map
}

#[derive(Deserialize)]
struct FlashcardCsvRow {
    #[serde(alias = "Flashcard ID", alias = "flashcard_id")]
    id: Value,
    #[serde(alias = "text_and_extra", alias = "Flashcard")]
    text: String,
}

/// Loads flashcards from a CSV with an `id` column and a `text` column
/// (`text_and_extra` is accepted as the deck export's name for it).
///
/// Rows with an empty text are skipped; duplicate ids are kept so the index
/// builder can reject them.
pub fn load_flashcards(path: &Path) -> Result<Vec<FlashcardSource>> {
    let mut reader = csv::Reader::from_path(path).with_context(|| format!("opening {}", path.display()))?;
    let mut out = Vec::new();
    for (line, row) in reader.deserialize::<FlashcardCsvRow>().enumerate() {
        let row = row.map_err(|e| Error::MalformedInput {
            path: path.display().to_string(),
            reason: format!("row {}: {}", line + 1, e),
        })?;
        let text = row.text.trim();
        if text.is_empty() {
            warn!(row = line + 1, "skipping flashcard with empty text");
            continue;
        }
        let id = match row.id {
            Value::String(s) => s.trim().to_string(),
            other => other.to_string(),
        };
        out.push(FlashcardSource { id, text: text.to_string() });
    }
    info!(path = %path.display(), flashcards = out.len(), "loaded flashcards");
    Ok(out)
}

fn list_json_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("json"))
        .collect();
    files.sort();
    files
}
