use crate::error::IngestError;
use crate::extractor::PageText;
use crate::models::{Document, IngestionOptions, PdfChunk};
use crate::outline::{Breadcrumb, Heading, HeadingDetector};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingStrategy {
    /// Sliding word windows with overlap.
    #[default]
    FixedWindow,
    /// Blank-line paragraphs packed up to `max_chars`.
    Paragraph,
    /// One chunk per page, line structure preserved.
    Page,
}

impl ChunkingStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FixedWindow => "fixed_window",
            Self::Paragraph => "paragraph",
            Self::Page => "page",
        }
    }
}

impl fmt::Display for ChunkingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkingStrategy {
    type Err = IngestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fixed_window" | "window" | "fixed" => Ok(Self::FixedWindow),
            "paragraph" => Ok(Self::Paragraph),
            "page" => Ok(Self::Page),
            other => Err(IngestError::InvalidArgument(format!(
                "unknown chunking strategy: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub strategy: ChunkingStrategy,
    pub window_words: usize,
    pub overlap_words: usize,
    pub max_chars: usize,
}

impl From<IngestionOptions> for ChunkingConfig {
    fn from(value: IngestionOptions) -> Self {
        Self {
            strategy: value.chunking,
            window_words: value.chunk_window_words,
            overlap_words: value.chunk_overlap_words,
            max_chars: value.chunk_max_chars,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.window_words == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "window_words must be positive".to_string(),
            ));
        }
        if self.overlap_words >= self.window_words {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap_words ({}) must be smaller than window_words ({})",
                self.overlap_words, self.window_words
            )));
        }
        if self.max_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "max_chars must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// A piece of one page plus the offset of its first word within the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Piece {
    pub text: String,
    pub start_word: usize,
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn chunk_fixed_window(text: &str, window_words: usize, overlap_words: usize) -> Vec<Piece> {
    let words = text.split_whitespace().collect::<Vec<_>>();
    let window = window_words.max(1);
    let step = window.saturating_sub(overlap_words).max(1);

    let mut pieces = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let end = (start + window).min(words.len());
        pieces.push(Piece {
            text: words[start..end].join(" "),
            start_word: start,
        });
        if end == words.len() {
            break;
        }
        start += step;
    }
    pieces
}

pub fn chunk_by_paragraph(text: &str, max_chars: usize) -> Vec<Piece> {
    let max_chars = max_chars.max(1);
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_start = 0;
    let mut word_cursor = 0;

    for paragraph in split_paragraphs(text) {
        let paragraph_words = paragraph.split_whitespace().count();
        let paragraph_chars = paragraph.chars().count();

        if paragraph_chars > max_chars {
            if !current.is_empty() {
                pieces.push(Piece {
                    text: std::mem::take(&mut current),
                    start_word: current_start,
                });
            }
            pieces.extend(split_long_paragraph(&paragraph, max_chars, word_cursor));
        } else if current.is_empty() {
            current = paragraph;
            current_start = word_cursor;
        } else if current.chars().count() + 2 + paragraph_chars <= max_chars {
            current.push_str("\n\n");
            current.push_str(&paragraph);
        } else {
            pieces.push(Piece {
                text: std::mem::replace(&mut current, paragraph),
                start_word: current_start,
            });
            current_start = word_cursor;
        }

        word_cursor += paragraph_words;
    }

    if !current.is_empty() {
        pieces.push(Piece {
            text: current,
            start_word: current_start,
        });
    }

    pieces
}

pub fn chunk_page(text: &str, max_chars: usize) -> Vec<Piece> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if trimmed.chars().count() <= max_chars {
        return vec![Piece {
            text: trimmed.to_string(),
            start_word: 0,
        }];
    }
    chunk_by_paragraph(text, max_chars)
}

pub fn split_page(text: &str, config: &ChunkingConfig) -> Vec<Piece> {
    match config.strategy {
        ChunkingStrategy::FixedWindow => {
            chunk_fixed_window(text, config.window_words, config.overlap_words)
        }
        ChunkingStrategy::Paragraph => chunk_by_paragraph(text, config.max_chars),
        ChunkingStrategy::Page => chunk_page(text, config.max_chars),
    }
}

/// Chunks every page of `document` in reading order.
///
/// Chunk indices are contiguous from zero across the whole document and each
/// chunk carries the heading breadcrumb in effect at its first word.
pub fn build_chunks(
    document: &Document,
    pages: &[PageText],
    config: &ChunkingConfig,
    detector: &HeadingDetector,
) -> Vec<PdfChunk> {
    let mut chunks = Vec::new();
    let mut breadcrumb = Breadcrumb::default();
    let mut cursor = 0u64;

    for page in pages {
        let headings = page_headings(&page.text, detector);
        let mut pending = headings.into_iter().peekable();

        for piece in split_page(&page.text, config) {
            while let Some((_, heading)) = pending.next_if(|(offset, _)| *offset <= piece.start_word) {
                breadcrumb.observe(heading);
            }

            let text_normalized = normalize_whitespace(&piece.text);
            if text_normalized.is_empty() {
                continue;
            }

            chunks.push(PdfChunk {
                chunk_id: make_chunk_id(&document.document_id, page.number, cursor, &piece.text),
                document_id: document.document_id.clone(),
                document_name: document.document_name.clone(),
                page_number: page.number,
                chunk_index: cursor,
                section_path: breadcrumb.path(),
                text_raw: piece.text,
                text_normalized,
            });
            cursor = cursor.saturating_add(1);
        }

        for (_, heading) in pending {
            breadcrumb.observe(heading);
        }
    }

    chunks
}

fn page_headings(text: &str, detector: &HeadingDetector) -> Vec<(usize, Heading)> {
    let mut offset = 0;
    let mut headings = Vec::new();
    for line in text.lines() {
        if let Some(heading) = detector.detect(line) {
            headings.push((offset, heading));
        }
        offset += line.split_whitespace().count();
    }
    headings
}

fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(trimmed);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n"));
    }
    paragraphs
}

fn split_long_paragraph(paragraph: &str, max_chars: usize, first_word: usize) -> Vec<Piece> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_start = first_word;

    for (index, word) in paragraph.split_whitespace().enumerate() {
        let word_offset = first_word + index;
        let word_chars = word.chars().count();

        if word_chars > max_chars {
            if !current.is_empty() {
                pieces.push(Piece {
                    text: std::mem::take(&mut current),
                    start_word: current_start,
                });
            }
            // Kept whole so codes and URLs stay searchable.
            pieces.push(Piece {
                text: word.to_string(),
                start_word: word_offset,
            });
            continue;
        }

        if current.is_empty() {
            current.push_str(word);
            current_start = word_offset;
        } else if current.chars().count() + 1 + word_chars <= max_chars {
            current.push(' ');
            current.push_str(word);
        } else {
            pieces.push(Piece {
                text: std::mem::replace(&mut current, word.to_string()),
                start_word: current_start,
            });
            current_start = word_offset;
        }
    }

    if !current.is_empty() {
        pieces.push(Piece {
            text: current,
            start_word: current_start,
        });
    }
    pieces
}

fn make_chunk_id(document_id: &str, page: u32, index: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(page.to_le_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
