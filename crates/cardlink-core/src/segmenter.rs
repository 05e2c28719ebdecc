//! Transcript segmentation into bounded-length paragraphs.
//!
//! Transcripts are first split into sentences, then sentences are packed
//! greedily into paragraphs whose word count stays within
//! `max_paragraph_length`. A sentence is never split: a sentence longer than
//! the ceiling becomes a paragraph on its own.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::types::{TranscriptChunk, TranscriptRecord};

pub const DEFAULT_MAX_PARAGRAPH_LENGTH: usize = 150;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    pub max_paragraph_length: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self { max_paragraph_length: DEFAULT_MAX_PARAGRAPH_LENGTH }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Segmenter {
    config: SegmenterConfig,
}

impl Segmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self { config }
    }

    pub fn segment(&self, record: &TranscriptRecord) -> Vec<TranscriptChunk> {
        split_into_paragraphs(&record.transcript_text, self.config.max_paragraph_length)
            .into_iter()
            .enumerate()
            .map(|(chunk_index, text)| TranscriptChunk {
                source_video_id: record.video_id.clone(),
                chunk_index,
                text,
            })
            .collect()
    }
}

/// Packs sentences into paragraphs of at most `max_words` words.
pub fn split_into_paragraphs(text: &str, max_words: usize) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_len = 0usize;
    for sentence in split_sentences(text) {
        let sentence_len = word_count(&sentence);
        if current_len + sentence_len > max_words && !current.is_empty() {
            paragraphs.push(current.join(" "));
            current.clear();
            current_len = 0;
        }
        current.push(sentence);
        current_len += sentence_len;
    }
    if !current.is_empty() {
        paragraphs.push(current.join(" "));
    }
    paragraphs
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Rule-based sentence tokenizer.
///
/// A token ending in `.`, `!` or `?` (optionally followed by closing quotes
/// or brackets) ends a sentence. Titles such as `Dr.` never do. Short forms
/// that double as words or numerals (`no.`, `al.`, `fig.`, single letters)
/// only hold the sentence open when the next word starts lowercase or with a
/// digit. Whitespace inside a sentence is collapsed to single spaces.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut tokens = text.split_whitespace().peekable();
    while let Some(token) = tokens.next() {
        current.push(token);
        if ends_sentence(token, tokens.peek().copied()) {
            sentences.push(current.join(" "));
            current.clear();
        }
    }
    if !current.is_empty() {
        sentences.push(current.join(" "));
    }
    sentences
}

fn ends_sentence(token: &str, next: Option<&str>) -> bool {
    let core = token.trim_end_matches(|c: char| CLOSERS.contains(&c));
    if !core.ends_with(['.', '!', '?']) {
        return false;
    }
    if core.ends_with('.') && !core.ends_with("..") {
        if is_title(core) {
            return false;
        }
        if is_short_form(core) && next.is_some_and(continues_sentence) {
            return false;
        }
    }
    true
}

fn continues_sentence(next: &str) -> bool {
    next.trim_start_matches(|c: char| OPENERS.contains(&c))
        .chars()
        .next()
        .is_some_and(|c| c.is_lowercase() || c.is_ascii_digit())
}

const CLOSERS: [char; 6] = ['"', '\'', ')', ']', '\u{201D}', '\u{2019}'];
const OPENERS: [char; 5] = ['"', '\'', '(', '[', '\u{201C}'];

fn is_title(token: &str) -> bool {
    static TITLE: OnceLock<Regex> = OnceLock::new();
    TITLE
        .get_or_init(|| Regex::new(r"(?i)^[(\[]?(?:dr|mr|mrs|ms|prof|sr|jr|st)\.$").expect("title pattern is valid"))
        .is_match(token)
}

fn is_short_form(token: &str) -> bool {
    static SHORT_FORM: OnceLock<Regex> = OnceLock::new();
    SHORT_FORM
        .get_or_init(|| {
            Regex::new(r"(?i)^[(\[]?(?:[a-z]|vs|etc|approx|fig|figs|no|vol|ca|cf|al|e\.g|i\.e|u\.s)\.$")
                .expect("short form pattern is valid")
        })
        .is_match(token)
}
