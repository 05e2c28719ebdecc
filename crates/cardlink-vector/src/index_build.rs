//! Flashcard index building.
//!
//! Ids are checked for duplicates before anything is encoded; the encoder is
//! then called once per `batch_size` flashcards and every response is checked
//! against the batch it answers. Nothing is persisted unless the whole deck
//! encodes cleanly.

use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

use cardlink_core::traits::Embedder;
use cardlink_core::types::FlashcardSource;

use crate::store::{check_unique, FlashcardIndex};

#[derive(Debug, Error)]
pub enum IndexBuildError {
    #[error("no flashcards to index")]
    Empty,

    #[error("duplicate flashcard id '{0}'")]
    DuplicateId(String),

    #[error("encoder returned {got} vectors for {expected} texts")]
    CountMismatch { expected: usize, got: usize },

    #[error("vector for flashcard '{id}' has dimension {got}, expected {expected}")]
    DimensionMismatch { id: String, expected: usize, got: usize },

    #[error("encoding failed: {0:#}")]
    Encode(anyhow::Error),
}

pub struct IndexBuilder<'a> {
    embedder: &'a dyn Embedder,
    batch_size: usize,
    show_progress: bool,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(embedder: &'a dyn Embedder, batch_size: usize) -> Self {
        Self { embedder, batch_size: batch_size.max(1), show_progress: false }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn build(&self, cards: &[FlashcardSource]) -> Result<FlashcardIndex, IndexBuildError> {
        if cards.is_empty() {
            return Err(IndexBuildError::Empty);
        }
        let ids: Vec<String> = cards.iter().map(|c| c.id.clone()).collect();
        check_unique(&ids)?;
        let texts: Vec<String> = cards.iter().map(|c| c.text.clone()).collect();

        let start = Instant::now();
        let pb = if self.show_progress { ProgressBar::new(cards.len() as u64) } else { ProgressBar::hidden() };
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} flashcards ({percent}%)")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );

        let mut vectors = Vec::with_capacity(texts.len());
        for (batch_no, batch) in texts.chunks(self.batch_size).enumerate() {
            let out = self.embedder.embed_batch(batch).map_err(IndexBuildError::Encode)?;
            if out.len() != batch.len() {
                return Err(IndexBuildError::CountMismatch { expected: batch.len(), got: out.len() });
            }
            debug!(batch = batch_no, size = batch.len(), "encoded flashcard batch");
            vectors.extend(out);
            pb.inc(batch.len() as u64);
        }
        pb.finish_and_clear();

        let index = FlashcardIndex::new(self.embedder.embedder_id(), ids, texts, vectors)?;
        info!(
            flashcards = index.len(),
            dim = index.dim,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "built flashcard index"
        );
        Ok(index)
    }
}

/// Builds the index for `cards` and writes it to `path`.
pub fn build_and_save(
    embedder: &dyn Embedder,
    cards: &[FlashcardSource],
    batch_size: usize,
    path: &Path,
    show_progress: bool,
) -> anyhow::Result<FlashcardIndex> {
    let index = IndexBuilder::new(embedder, batch_size).with_progress(show_progress).build(cards)?;
    index.save(path)?;
    Ok(index)
}
