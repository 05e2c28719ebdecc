use anyhow::{ensure, Context, Result};
use std::time::Instant;
use tracing::{debug, info};

use cardlink_core::segmenter::Segmenter;
use cardlink_core::traits::Embedder;
use cardlink_core::types::{MatchRow, TranscriptRecord};
use cardlink_vector::{FlashcardIndex, MatchError, MatchParams, SimilarityMatcher};

use crate::progress_bar;

/// Segments every transcript, encodes its chunks and emits one working-table
/// row per (chunk, matched flashcard).
pub struct MatchStage<'a> {
    embedder: &'a dyn Embedder,
    segmenter: Segmenter,
    matcher: SimilarityMatcher<'a>,
    encode_batch_size: usize,
    show_progress: bool,
}

impl<'a> MatchStage<'a> {
    pub fn new(
        embedder: &'a dyn Embedder,
        index: &'a FlashcardIndex,
        segmenter: Segmenter,
        params: MatchParams,
    ) -> std::result::Result<Self, MatchError> {
        let matcher = SimilarityMatcher::for_encoder(index, params, embedder.embedder_id())?;
        Ok(Self { embedder, segmenter, matcher, encode_batch_size: 32, show_progress: false })
    }

    pub fn with_encode_batch_size(mut self, size: usize) -> Self {
        self.encode_batch_size = size.max(1);
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn run(&self, records: &[TranscriptRecord]) -> Result<Vec<MatchRow>> {
        let start = Instant::now();
        let pb = progress_bar(records.len(), "videos", self.show_progress);
        let mut rows = Vec::new();
        let mut total_chunks = 0usize;
        for record in records {
            pb.set_message(record.video_title.clone());
            let before = rows.len();
            let chunks = self.segmenter.segment(record);
            total_chunks += chunks.len();
            let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
            for (batch_chunks, batch_texts) in chunks.chunks(self.encode_batch_size).zip(texts.chunks(self.encode_batch_size)) {
                let vectors = self
                    .embedder
                    .embed_batch(batch_texts)
                    .with_context(|| format!("encoding transcript chunks of '{}'", record.video_title))?;
                ensure!(
                    vectors.len() == batch_texts.len(),
                    "encoder returned {} vectors for {} chunks",
                    vectors.len(),
                    batch_texts.len()
                );
                for (chunk, vector) in batch_chunks.iter().zip(&vectors) {
                    let candidates = self.matcher.match_chunk(chunk, vector)?;
                    rows.extend(candidates.into_iter().map(|c| MatchRow::from_candidate(record, c)));
                }
            }
            debug!(video = %record.video_title, chunks = chunks.len(), matches = rows.len() - before, "matched video");
            pb.inc(1);
        }
        pb.finish_and_clear();
        info!(
            videos = records.len(),
            chunks = total_chunks,
            rows = rows.len(),
            threshold = self.matcher.params().threshold,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "match stage finished"
        );
        Ok(rows)
    }
}
