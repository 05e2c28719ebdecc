//! Flashcard embedding index: building, persistence and similarity matching.
//!
//! The index is a single JSON document holding parallel `ids`, `texts` and
//! `vectors` arrays; a flashcard's position is its key everywhere else.

pub mod index_build;
pub mod search;
pub mod store;

pub use index_build::{build_and_save, IndexBuildError, IndexBuilder};
pub use search::{cosine, round_score, MatchError, MatchParams, ScoredFlashcard, SimilarityMatcher};
pub use store::FlashcardIndex;
