//! Flashcard relevance classification: prompt construction, the
//! Messages-API client, response repair and label normalization.

pub mod batcher;
pub mod client;
pub mod parse;
pub mod prompt;

pub use batcher::{classify_batch, BatchResult};
pub use client::MessagesClassifier;
pub use parse::{normalize_slot, parse_response, ClassificationParseError, ParseOutcome, ParsedBatch};
