//! Character-window text splitting with exact overlap.
//!
//! Sizes and offsets count Unicode scalar values, never bytes. Consecutive
//! spans always share exactly `chunk_overlap` characters, so [`reconstruct`]
//! is a lossless inverse of [`Chunker::split`].

use forge_core::config::RetrievalConfig;
use forge_core::error::ForgeError;
use serde::Serialize;

/// Separators tried, in order, when `prefer_separators` is set.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Move a window end back to a natural break found in the window's
    /// second half.
    pub prefer_separators: bool,
}

impl From<&RetrievalConfig> for ChunkerConfig {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            prefer_separators: config.prefer_separators,
        }
    }
}

/// A window of the source text. `start..end` are character offsets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextSpan {
    pub index: usize,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Result<Self, ForgeError> {
        if config.chunk_size == 0 {
            return Err(ForgeError::Config("chunk_size must be positive".into()));
        }
        if config.chunk_overlap >= config.chunk_size {
            return Err(ForgeError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                config.chunk_overlap, config.chunk_size
            )));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> ChunkerConfig {
        self.config
    }

    pub fn split(&self, text: &str) -> Vec<TextSpan> {
        // Byte offset of every character boundary, plus the end of the text.
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(b, _)| b)
            .chain(std::iter::once(text.len()))
            .collect();
        let len = bounds.len() - 1;
        if len == 0 {
            return Vec::new();
        }

        let ChunkerConfig {
            chunk_size: size,
            chunk_overlap: overlap,
            prefer_separators,
        } = self.config;

        let mut spans = Vec::new();
        let mut start = 0;
        loop {
            let mut end = (start + size).min(len);
            if prefer_separators && end < len {
                end = self.natural_break(text, &bounds, start, end);
            }

            spans.push(TextSpan {
                index: spans.len(),
                start,
                end,
                text: text[bounds[start]..bounds[end]].to_string(),
            });

            if end >= len {
                break;
            }
            start = end - overlap;
        }
        spans
    }

    /// Last separator end inside the second half of `start..end`, or `end`.
    ///
    /// The result always leaves room for the overlap so the next window
    /// starts strictly after `start`.
    fn natural_break(&self, text: &str, bounds: &[usize], start: usize, end: usize) -> usize {
        let size = self.config.chunk_size;
        let floor = (start + size / 2).max(start + self.config.chunk_overlap + 1);
        if floor >= end {
            return end;
        }
        let window = &text[bounds[floor]..bounds[end]];
        for sep in SEPARATORS {
            if let Some(pos) = window.rfind(sep) {
                let cut_byte = bounds[floor] + pos + sep.len();
                if let Ok(cut) = bounds.binary_search(&cut_byte) {
                    if cut > floor {
                        return cut;
                    }
                }
            }
        }
        end
    }
}

/// Rebuild the source text from spans produced with the given overlap.
pub fn reconstruct(spans: &[TextSpan], overlap: usize) -> String {
    let mut out = String::new();
    for (i, span) in spans.iter().enumerate() {
        if i == 0 {
            out.push_str(&span.text);
        } else {
            out.extend(span.text.chars().skip(overlap));
        }
    }
    out
}
