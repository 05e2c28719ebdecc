//! cardlink-core
//!
//! Shared records, service traits, configuration and the paragraph segmenter
//! used by every stage of the transcript-to-flashcard pipeline.

pub mod catalog;
pub mod config;
pub mod error;
pub mod segmenter;
pub mod table;
pub mod traits;
pub mod types;
