//! Machine translation of note fields.
//!
//! A [`Translator`] performs one request per piece of text. The
//! [`TranslationSession`] around it splits long text, retries failed requests
//! and falls back to the original text, so a translation run never aborts on
//! a single field.

use std::{
    thread,
    time::Duration,
};

use log::{
    debug,
    error,
    info,
    warn,
};

use crate::core::{
    config::TranslationConfig,
    Result,
};

pub mod deepl;
pub mod html;
pub mod notes;
pub mod routing;

pub use deepl::DeepLTranslator;
pub use notes::{
    assemble_notes,
    run_translation,
    TranslateOptions,
    TranslateReport,
};
pub use routing::FieldAction;

pub trait Translator {
    fn translate(&self, text: &str) -> Result<String>;
}

impl<T: Translator + ?Sized> Translator for &T {
    fn translate(&self, text: &str) -> Result<String> {
        (**self).translate(text)
    }
}

pub struct TranslationSession<T: Translator> {
    translator: T,
    max_chunk_len: usize,
    retry_count: u32,
    retry_delay: Duration,
}

impl<T: Translator> TranslationSession<T> {
    pub fn new(translator: T, max_chunk_len: usize, retry_count: u32, retry_delay: Duration) -> Self {
        Self { translator, max_chunk_len: max_chunk_len.max(1), retry_count: retry_count.max(1), retry_delay }
    }

    pub fn from_config(translator: T, config: &TranslationConfig) -> Self {
        Self::new(translator, config.max_chunk_len, config.retry_count, config.retry_delay())
    }

    /// Blank text is returned untouched. Any chunk that cannot be translated
    /// keeps its original content.
    pub fn translate_text(&self, text: &str) -> String {
        if text.trim().is_empty() {
            return text.to_string();
        }
        if text.chars().count() <= self.max_chunk_len {
            return self.translate_chunk(text);
        }

        let chunks = split_into_chunks(text, self.max_chunk_len);
        warn!(
            "Text too long ({} chars), translating it in {} chunks. Context may be lost at chunk borders.",
            text.chars().count(),
            chunks.len()
        );
        chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| {
                info!("Translating chunk {}/{}", i + 1, chunks.len());
                self.translate_chunk(chunk)
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn translate_chunk(&self, chunk: &str) -> String {
        debug!("Translating chunk: {}", chunk);
        for attempt in 1..=self.retry_count {
            match self.translator.translate(chunk) {
                Ok(result) if !result.trim().is_empty() => return result,
                Ok(_) => {
                    error!("Empty translation for '{}', keeping the original", preview(chunk));
                    return chunk.to_string();
                }
                Err(e) => {
                    warn!(
                        "Translation attempt {}/{} failed: {}. Retrying in {:?}",
                        attempt, self.retry_count, e, self.retry_delay
                    );
                    if attempt < self.retry_count {
                        thread::sleep(self.retry_delay);
                    }
                }
            }
        }
        error!("Failed to translate '{}' after {} attempts, keeping the original", preview(chunk), self.retry_count);
        chunk.to_string()
    }
}

fn preview(text: &str) -> String {
    text.chars().take(50).collect()
}

/// Sentences end after `.`, `?` or `!` followed by whitespace; newline runs
/// also separate sentences. Separators are dropped.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\n' {
            while chars.peek() == Some(&'\n') {
                chars.next();
            }
            sentences.push(std::mem::take(&mut current));
            continue;
        }
        current.push(c);
        if matches!(c, '.' | '?' | '!') && chars.peek().is_some_and(|n| n.is_whitespace()) {
            while chars.peek().is_some_and(|n| n.is_whitespace() && *n != '\n') {
                chars.next();
            }
            if chars.peek() != Some(&'\n') {
                sentences.push(std::mem::take(&mut current));
            }
        }
    }
    sentences.push(current);
    sentences.into_iter().filter(|s| !s.trim().is_empty()).collect()
}

/// Greedy packing of sentences into space-joined chunks of at most
/// `max_len` chars. A single sentence over the limit becomes its own chunk.
pub fn split_into_chunks(text: &str, max_len: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for sentence in split_sentences(text) {
        let len = sentence.chars().count();
        let separator = usize::from(!current.is_empty());
        if !current.is_empty() && current_len + separator + len > max_len {
            chunks.push(std::mem::take(&mut current).trim().to_string());
            current_len = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(&sentence);
        current_len += len;
    }
    if !current.trim().is_empty() {
        chunks.push(current.trim().to_string());
    }
    chunks
}
