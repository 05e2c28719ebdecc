/// Sentence encoder used for both flashcards and transcript chunks.
///
/// Implementations must be order preserving (`out[i]` belongs to
/// `texts[i]`) and return vectors of length `dim()`. A text's vector must not
/// depend on the other texts in the same call.
pub trait Embedder: Send + Sync {
    /// Stable identifier of the model and pooling, recorded in index files.
    fn embedder_id(&self) -> &str;
    fn dim(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Relevance classifier behind an LLM.
///
/// `items` are the flashcard texts of one batch in slot order; the raw
/// response is expected to map `Flashcard_<n>` (1-based, same order) to a
/// classification phrase. Transport failures are returned as errors; a
/// malformed response is returned as-is for the caller to repair.
pub trait Classifier {
    fn classify(&self, context: &str, items: &[String]) -> anyhow::Result<String>;
}
