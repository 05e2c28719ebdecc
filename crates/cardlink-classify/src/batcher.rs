use anyhow::{ensure, Result};
use tracing::debug;

use cardlink_core::traits::Classifier;
use cardlink_core::types::ClassificationLabel;

use crate::parse::{parse_response, ParseOutcome};

#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    /// Same length and order as the flashcards sent.
    pub labels: Vec<ClassificationLabel>,
    pub outcome: ParseOutcome,
}

/// Classifies one batch of a video's flashcards against its full transcript.
///
/// Exactly one classifier call is made. Transport errors propagate; a bad
/// response degrades to `NoClass` labels.
pub fn classify_batch(classifier: &dyn Classifier, transcript: &str, flashcards: &[String]) -> Result<BatchResult> {
    ensure!(!flashcards.is_empty(), "cannot classify an empty batch");
    let raw = classifier.classify(transcript, flashcards)?;
    debug!(batch = flashcards.len(), response = %raw, "classifier response");
    let parsed = parse_response(&raw, flashcards.len());
    Ok(BatchResult { labels: parsed.labels, outcome: parsed.outcome })
}
