//! Domain types passed between the pipeline stages.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub type FlashcardId = String;

/// One catalogued video together with its transcript.
///
/// Deserializes from the linked catalog JSON. Identifier fields are accepted
/// as strings or numbers because the upstream export mixes both. The cadmore
/// id is read from `cadmoreAlternateID` and falls back to `Id`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawTranscriptRecord")]
pub struct TranscriptRecord {
    pub video_id: String,
    pub cadmore_id: String,
    pub category_title: String,
    pub subcategory_title: String,
    pub product: String,
    pub video_title: String,
    pub video_url: String,
    pub updated_status: String,
    pub transcript_text: String,
}

#[derive(Deserialize)]
struct RawTranscriptRecord {
    #[serde(rename = "videoID", default)]
    video_id: Value,
    #[serde(rename = "cadmoreAlternateID", default)]
    cadmore_alternate_id: Value,
    #[serde(rename = "Id", default)]
    id: Value,
    #[serde(rename = "categoryTitle", default)]
    category_title: Value,
    #[serde(rename = "subcategoryTitle", default)]
    subcategory_title: Value,
    #[serde(default)]
    product: Value,
    #[serde(rename = "videoTitle", default)]
    video_title: Value,
    #[serde(rename = "videoUrl", default)]
    video_url: Value,
    #[serde(rename = "updatedStatus", default)]
    updated_status: Value,
    #[serde(rename = "Transcript", default)]
    transcript: Value,
}

impl From<RawTranscriptRecord> for TranscriptRecord {
    fn from(raw: RawTranscriptRecord) -> Self {
        let cadmore_id = match value_to_string(&raw.cadmore_alternate_id) {
            id if id.is_empty() => value_to_string(&raw.id),
            id => id,
        };
        let video_title = match value_to_string(&raw.video_title) {
            t if t.is_empty() => "Unnamed".to_string(),
            t => t,
        };
        Self {
            video_id: value_to_string(&raw.video_id),
            cadmore_id,
            category_title: value_to_string(&raw.category_title),
            subcategory_title: value_to_string(&raw.subcategory_title),
            product: value_to_string(&raw.product),
            video_title,
            video_url: value_to_string(&raw.video_url),
            updated_status: value_to_string(&raw.updated_status),
            transcript_text: value_to_string(&raw.transcript),
        }
    }
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => match n.as_f64() {
            // spreadsheet exports turn integer ids into floats like 1234.0
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// A bounded span of consecutive transcript sentences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptChunk {
    pub source_video_id: String,
    pub chunk_index: usize,
    pub text: String,
}

/// A flashcard as fed to the index builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashcardSource {
    pub id: FlashcardId,
    pub text: String,
}

/// A flashcard resolved from a built index.
#[derive(Debug, Clone, PartialEq)]
pub struct FlashcardEntry<'a> {
    pub id: &'a str,
    pub text: &'a str,
    pub vector: &'a [f32],
}

/// A flashcard that cleared the similarity threshold for one chunk.
///
/// `score` is already rounded to four decimals.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    pub chunk: TranscriptChunk,
    pub flashcard_id: FlashcardId,
    pub flashcard_text: String,
    pub score: f32,
}

/// Relevance of a flashcard to a video.
///
/// `NoClass` means the relevance could not be determined (unparseable or
/// missing classifier output); it is distinct from `NonRelevant`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassificationLabel {
    #[serde(rename = "Primary Flashcard")]
    Primary,
    #[serde(rename = "Secondary Flashcard")]
    Secondary,
    #[serde(rename = "Non-Relevant Flashcard")]
    NonRelevant,
    #[serde(rename = "No Class")]
    NoClass,
}

impl ClassificationLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationLabel::Primary => "Primary Flashcard",
            ClassificationLabel::Secondary => "Secondary Flashcard",
            ClassificationLabel::NonRelevant => "Non-Relevant Flashcard",
            ClassificationLabel::NoClass => "No Class",
        }
    }
}

impl fmt::Display for ClassificationLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the working table: a (chunk, flashcard) match for a video.
///
/// Column names match the review spreadsheets the curation team already
/// uses. `classification` stays empty until the row has been classified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRow {
    #[serde(rename = "categoryTitle", default)]
    pub category_title: String,
    #[serde(rename = "subcategoryTitle", default)]
    pub subcategory_title: String,
    #[serde(rename = "videoID", default)]
    pub video_id: String,
    #[serde(rename = "cadmoreAlternateID", default)]
    pub cadmore_id: String,
    #[serde(rename = "videoTitle")]
    pub video_title: String,
    #[serde(default)]
    pub product: String,
    #[serde(rename = "videoUrl", default)]
    pub video_url: String,
    #[serde(rename = "Update status", default)]
    pub updated_status: String,
    #[serde(rename = "Transcript Chunk")]
    pub transcript_chunk: String,
    #[serde(rename = "Flashcard")]
    pub flashcard: String,
    #[serde(rename = "Flashcard ID")]
    pub flashcard_id: FlashcardId,
    #[serde(rename = "Score")]
    pub score: f32,
    #[serde(rename = "Flashcard Classification", default)]
    pub classification: Option<ClassificationLabel>,
}

impl MatchRow {
    pub fn from_candidate(record: &TranscriptRecord, candidate: MatchCandidate) -> Self {
        Self {
            category_title: record.category_title.clone(),
            subcategory_title: record.subcategory_title.clone(),
            video_id: record.video_id.clone(),
            cadmore_id: record.cadmore_id.clone(),
            video_title: record.video_title.clone(),
            product: record.product.clone(),
            video_url: record.video_url.clone(),
            updated_status: record.updated_status.clone(),
            transcript_chunk: candidate.chunk.text,
            flashcard: candidate.flashcard_text,
            flashcard_id: candidate.flashcard_id,
            score: candidate.score,
            classification: None,
        }
    }

    /// Identity of a row within its video; stable across reruns.
    pub fn pair_key(&self) -> (&str, &str) {
        (self.transcript_chunk.as_str(), self.flashcard_id.as_str())
    }
}
