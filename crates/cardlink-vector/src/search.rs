//! Exhaustive cosine matching of chunk vectors against the flashcard index.

use std::cmp::Ordering;
use thiserror::Error;

use cardlink_core::config::MatcherConfig;
use cardlink_core::types::{MatchCandidate, TranscriptChunk};

use crate::store::{l2_norm, FlashcardIndex};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchParams {
    pub threshold: f32,
    pub top_k: usize,
}

impl Default for MatchParams {
    fn default() -> Self {
        Self { threshold: 0.65, top_k: 20 }
    }
}

impl From<&MatcherConfig> for MatchParams {
    fn from(cfg: &MatcherConfig) -> Self {
        Self { threshold: cfg.threshold, top_k: cfg.top_k }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum MatchError {
    #[error("query vector has dimension {got}, index has {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("index was built with encoder '{index}' but chunks are encoded with '{encoder}'")]
    EncoderMismatch { index: String, encoder: String },
}

/// Index position of a flashcard and its rounded score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredFlashcard {
    pub position: usize,
    pub score: f32,
}

pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    cosine_with_norms(a, l2_norm(a), b, l2_norm(b))
}

fn cosine_with_norms(a: &[f32], norm_a: f32, b: &[f32], norm_b: f32) -> f32 {
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    dot / (norm_a * norm_b)
}

/// Rounds to four decimal places.
pub fn round_score(score: f32) -> f32 {
    ((score as f64 * 10_000.0).round() / 10_000.0) as f32
}

pub struct SimilarityMatcher<'a> {
    index: &'a FlashcardIndex,
    params: MatchParams,
}

impl<'a> SimilarityMatcher<'a> {
    pub fn new(index: &'a FlashcardIndex, params: MatchParams) -> Self {
        Self { index, params }
    }

    /// Like [`SimilarityMatcher::new`], but refuses an index built by a
    /// different encoder than the one producing chunk vectors.
    pub fn for_encoder(index: &'a FlashcardIndex, params: MatchParams, encoder_id: &str) -> Result<Self, MatchError> {
        if index.embedder_id != encoder_id {
            return Err(MatchError::EncoderMismatch {
                index: index.embedder_id.clone(),
                encoder: encoder_id.to_string(),
            });
        }
        Ok(Self::new(index, params))
    }

    pub fn params(&self) -> MatchParams {
        self.params
    }

    /// Flashcards scoring at least `threshold`, best first, at most `top_k`.
    /// Equal scores keep index order.
    pub fn match_vector(&self, query: &[f32]) -> Result<Vec<ScoredFlashcard>, MatchError> {
        if query.len() != self.index.dim {
            return Err(MatchError::DimensionMismatch { expected: self.index.dim, got: query.len() });
        }
        let query_norm = l2_norm(query);
        let mut hits: Vec<ScoredFlashcard> = (0..self.index.len())
            .filter_map(|position| {
                let (vector, norm) = self.index.vector_with_norm(position);
                let score = cosine_with_norms(query, query_norm, vector, norm);
                (score >= self.params.threshold).then(|| ScoredFlashcard { position, score: round_score(score) })
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        hits.truncate(self.params.top_k);
        Ok(hits)
    }

    pub fn match_chunk(&self, chunk: &TranscriptChunk, vector: &[f32]) -> Result<Vec<MatchCandidate>, MatchError> {
        let hits = self.match_vector(vector)?;
        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                let entry = self.index.entry(hit.position)?;
                Some(MatchCandidate {
                    chunk: chunk.clone(),
                    flashcard_id: entry.id.to_string(),
                    flashcard_text: entry.text.to_string(),
                    score: hit.score,
                })
            })
            .collect())
    }
}
