use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

use cardlink_core::error::Error;
use cardlink_core::table::temp_sibling;
use cardlink_core::types::{FlashcardEntry, FlashcardId};

use crate::index_build::IndexBuildError;

pub const INDEX_FORMAT_VERSION: u32 = 1;

/// Persisted flashcard index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "StoredIndex")]
pub struct FlashcardIndex {
    pub version: u32,
    pub embedder_id: String,
    pub dim: usize,
    pub built_at: DateTime<Utc>,
    /// blake3 over ids and texts, in order.
    pub fingerprint: String,
    ids: Vec<FlashcardId>,
    texts: Vec<String>,
    vectors: Vec<Vec<f32>>,
    #[serde(skip)]
    norms: Vec<f32>,
}

/// On-disk shape of [`FlashcardIndex`]; norms are derived on the way in.
#[derive(Deserialize)]
struct StoredIndex {
    version: u32,
    embedder_id: String,
    dim: usize,
    built_at: DateTime<Utc>,
    fingerprint: String,
    ids: Vec<FlashcardId>,
    texts: Vec<String>,
    vectors: Vec<Vec<f32>>,
}

impl From<StoredIndex> for FlashcardIndex {
    fn from(stored: StoredIndex) -> Self {
        let norms = stored.vectors.iter().map(|v| l2_norm(v)).collect();
        Self {
            version: stored.version,
            embedder_id: stored.embedder_id,
            dim: stored.dim,
            built_at: stored.built_at,
            fingerprint: stored.fingerprint,
            ids: stored.ids,
            texts: stored.texts,
            vectors: stored.vectors,
            norms,
        }
    }
}

impl FlashcardIndex {
    /// Assembles an index from parallel arrays, rejecting empty input,
    /// duplicate ids, length mismatches and ragged vectors.
    pub fn new(
        embedder_id: impl Into<String>,
        ids: Vec<FlashcardId>,
        texts: Vec<String>,
        vectors: Vec<Vec<f32>>,
    ) -> std::result::Result<Self, IndexBuildError> {
        if ids.is_empty() {
            return Err(IndexBuildError::Empty);
        }
        check_unique(&ids)?;
        if texts.len() != ids.len() {
            return Err(IndexBuildError::CountMismatch { expected: ids.len(), got: texts.len() });
        }
        if vectors.len() != ids.len() {
            return Err(IndexBuildError::CountMismatch { expected: ids.len(), got: vectors.len() });
        }
        let dim = vectors[0].len();
        for (id, v) in ids.iter().zip(&vectors) {
            if v.len() != dim || dim == 0 {
                return Err(IndexBuildError::DimensionMismatch { id: id.clone(), expected: dim, got: v.len() });
            }
        }
        let fingerprint = fingerprint(&ids, &texts);
        let norms = vectors.iter().map(|v| l2_norm(v)).collect();
        Ok(Self {
            version: INDEX_FORMAT_VERSION,
            embedder_id: embedder_id.into(),
            dim,
            built_at: Utc::now(),
            fingerprint,
            ids,
            texts,
            vectors,
            norms,
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[FlashcardId] {
        &self.ids
    }

    pub fn entry(&self, position: usize) -> Option<FlashcardEntry<'_>> {
        Some(FlashcardEntry {
            id: self.ids.get(position)?,
            text: self.texts.get(position)?,
            vector: self.vectors.get(position)?,
        })
    }

    pub(crate) fn vector_with_norm(&self, position: usize) -> (&[f32], f32) {
        (&self.vectors[position], self.norms[position])
    }

    /// Writes the index as JSON via a temp file and a rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        let tmp = temp_sibling(path);
        {
            let file = fs::File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, self)?;
            writer.flush()?;
        }
        fs::rename(&tmp, path).with_context(|| format!("renaming {} -> {}", tmp.display(), path.display()))?;
        info!(path = %path.display(), flashcards = self.len(), dim = self.dim, "saved flashcard index");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::NotFound(format!("flashcard index {}", path.display())).into());
        }
        let content = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let malformed = |reason: String| Error::MalformedInput { path: path.display().to_string(), reason };
        let index: FlashcardIndex = serde_json::from_str(&content).map_err(|e| malformed(e.to_string()))?;

        if index.version != INDEX_FORMAT_VERSION {
            return Err(malformed(format!("unsupported index version {}", index.version)).into());
        }
        if index.texts.len() != index.ids.len() || index.vectors.len() != index.ids.len() {
            return Err(malformed(format!(
                "array lengths differ: {} ids, {} texts, {} vectors",
                index.ids.len(),
                index.texts.len(),
                index.vectors.len()
            ))
            .into());
        }
        if let Some(pos) = index.vectors.iter().position(|v| v.len() != index.dim) {
            return Err(malformed(format!("vector {} does not have dimension {}", pos, index.dim)).into());
        }
        if fingerprint(&index.ids, &index.texts) != index.fingerprint {
            return Err(malformed("fingerprint does not match ids and texts".into()).into());
        }
        info!(
            path = %path.display(),
            flashcards = index.len(),
            embedder_id = %index.embedder_id,
            built_at = %index.built_at,
            "loaded flashcard index"
        );
        Ok(index)
    }
}

pub(crate) fn check_unique(ids: &[FlashcardId]) -> std::result::Result<(), IndexBuildError> {
    let mut seen = HashSet::with_capacity(ids.len());
    for id in ids {
        if !seen.insert(id.as_str()) {
            return Err(IndexBuildError::DuplicateId(id.clone()));
        }
    }
    Ok(())
}

fn fingerprint(ids: &[FlashcardId], texts: &[String]) -> String {
    let mut hasher = blake3::Hasher::new();
    for (id, text) in ids.iter().zip(texts) {
        hasher.update(id.as_bytes());
        hasher.update(&[0]);
        hasher.update(text.as_bytes());
        hasher.update(&[0xff]);
    }
    hasher.finalize().to_hex().to_string()
}

pub(crate) fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}
