//! Sentence-aware text chunking.
//!
//! Recovered document text is cut into bounded chunks for the indexing
//! collaborator. Chunks never break inside a sentence: a sentence that
//! would push a short buffer past `max_len` is kept with that buffer,
//! so a chunk may exceed `max_len` rather than fall below `min_len`.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::ChunkConfig;

/// One chunk of recovered text, ready for indexing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonChunk {
    /// Id of the lesson/job the text came from.
    pub lesson_id: String,
    /// Position in the source document, contiguous from 0.
    pub index: usize,
    pub text: String,
}

/// Receives chunks for retrieval indexing. Out-of-process concern;
/// implementations are free to batch or drop.
#[async_trait]
pub trait ChunkSink: Send + Sync {
    async fn index_chunks(&self, chunks: Vec<LessonChunk>) -> anyhow::Result<()>;
}

/// No-op sink for deployments without an indexing service.
pub struct NoOpSink;

#[async_trait]
impl ChunkSink for NoOpSink {
    async fn index_chunks(&self, chunks: Vec<LessonChunk>) -> anyhow::Result<()> {
        tracing::debug!(chunk_count = chunks.len(), "discarding chunks, no sink wired");
        Ok(())
    }
}

/// Split `text` into ordered, trimmed, non-empty chunks.
///
/// Sentences are joined by a single space while the buffer stays under
/// `max_len` characters. When the next sentence would cross the bound,
/// a buffer that has reached `min_len` is flushed; a still-short buffer
/// swallows the sentence instead, accepting the oversize.
pub fn chunk_text(text: &str, min_len: usize, max_len: usize) -> Vec<String> {
    let normalized = normalize_breaks(text);
    let trimmed = normalized.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0usize;

    for sentence in split_sentences(trimmed) {
        let sentence_chars = sentence.chars().count();

        if current_chars + sentence_chars < max_len {
            append_sentence(&mut current, &mut current_chars, sentence, sentence_chars);
        } else if current_chars >= min_len {
            chunks.push(std::mem::take(&mut current));
            current.push_str(sentence);
            current_chars = sentence_chars;
        } else {
            append_sentence(&mut current, &mut current_chars, sentence, sentence_chars);
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

/// Chunk recovered text and label each piece with its owner and index.
pub fn chunk_lesson(lesson_id: &str, text: &str, config: &ChunkConfig) -> Vec<LessonChunk> {
    chunk_text(text, config.min_len, config.max_len)
        .into_iter()
        .enumerate()
        .map(|(index, text)| LessonChunk {
            lesson_id: lesson_id.to_string(),
            index,
            text,
        })
        .collect()
}

fn append_sentence(current: &mut String, current_chars: &mut usize, sentence: &str, chars: usize) {
    if !current.is_empty() {
        current.push(' ');
        *current_chars += 1;
    }
    current.push_str(sentence);
    *current_chars += chars;
}

static BREAK_RUNS: OnceLock<Option<Regex>> = OnceLock::new();

fn break_runs() -> Option<&'static Regex> {
    BREAK_RUNS
        .get_or_init(|| Regex::new(r"\n{3,}").ok())
        .as_ref()
}

/// Collapse runs of 3+ newlines down to one paragraph break.
fn normalize_breaks(text: &str) -> String {
    match break_runs() {
        Some(re) => re.replace_all(text, "\n\n").into_owned(),
        None => text.to_string(),
    }
}

/// Split on sentence punctuation (`.`, `?`, `!`, `:`) followed by
/// whitespace. Deliberately naive; abbreviations split too, which only
/// costs an extra boundary, never lost text.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut after_boundary = false;

    for (i, ch) in text.char_indices() {
        if after_boundary && ch.is_whitespace() {
            let sentence = text[start..i].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = i;
            after_boundary = false;
            continue;
        }
        after_boundary = matches!(ch, '.' | '?' | '!' | ':');
    }

    let last = text[start..].trim();
    if !last.is_empty() {
        sentences.push(last);
    }

    sentences
}
