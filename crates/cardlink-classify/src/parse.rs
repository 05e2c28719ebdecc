//! Classifier response parsing.
//!
//! The model is asked for `{"Flashcard_1": "...", ...}` but sometimes
//! answers with single quotes or drops the braces. Parsing is strict first,
//! then one repair pass, and finally every slot falls back to `NoClass`.
//! Parse failures never leave this module.

use serde_json::{Map, Value};
use thiserror::Error;

use cardlink_core::types::ClassificationLabel;

use crate::prompt::slot_key;

#[derive(Debug, Error)]
pub enum ClassificationParseError {
    #[error("response is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("response is JSON but not an object")]
    NotAnObject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseOutcome {
    Strict,
    Repaired,
    Unparseable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBatch {
    pub labels: Vec<ClassificationLabel>,
    pub outcome: ParseOutcome,
}

pub fn parse_strict(raw: &str) -> Result<Map<String, Value>, ClassificationParseError> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        _ => Err(ClassificationParseError::NotAnObject),
    }
}

/// Swaps single quotes for double quotes and adds missing outer braces.
pub fn repair(raw: &str) -> String {
    let swapped = raw.replace('\'', "\"");
    let trimmed = swapped.trim();
    let mut fixed = String::with_capacity(trimmed.len() + 2);
    if !trimmed.starts_with('{') {
        fixed.push('{');
    }
    fixed.push_str(trimmed);
    if !trimmed.ends_with('}') {
        fixed.push('}');
    }
    fixed
}

/// Maps a slot value to a label by case-insensitive substring.
pub fn normalize_slot(value: Option<&Value>) -> ClassificationLabel {
    let Some(Value::String(s)) = value else {
        return ClassificationLabel::NoClass;
    };
    let s = s.to_lowercase();
    if s.contains("primary") {
        ClassificationLabel::Primary
    } else if s.contains("secondary") {
        ClassificationLabel::Secondary
    } else if s.contains("non-relevant") || s.contains("non relevant") {
        ClassificationLabel::NonRelevant
    } else {
        ClassificationLabel::NoClass
    }
}

/// One label per batch position, read from `Flashcard_1..=Flashcard_<n>`.
pub fn parse_response(raw: &str, n: usize) -> ParsedBatch {
    let (slots, outcome) = match parse_strict(raw) {
        Ok(map) => (Some(map), ParseOutcome::Strict),
        Err(first) => match parse_strict(&repair(raw)) {
            Ok(map) => {
                tracing::debug!(error = %first, "classifier response needed repair");
                (Some(map), ParseOutcome::Repaired)
            }
            Err(second) => {
                tracing::warn!(error = %second, response = raw, "unparseable classifier response; using No Class");
                (None, ParseOutcome::Unparseable)
            }
        },
    };
    let labels = (0..n)
        .map(|i| match &slots {
            Some(map) => normalize_slot(map.get(&slot_key(i))),
            None => ClassificationLabel::NoClass,
        })
        .collect();
    ParsedBatch { labels, outcome }
}
