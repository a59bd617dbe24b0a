use crate::chunking::ChunkingStrategy;
use crate::error::SearchError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub document_id: String,
    pub document_name: String,
    pub checksum: String,
    pub byte_len: u64,
    pub pages_indexed: u32,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PdfChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub document_name: String,
    pub page_number: u32,
    pub chunk_index: u64,
    pub section_path: Option<String>,
    pub text_raw: String,
    pub text_normalized: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentSummary {
    pub doc_id: String,
    pub doc_name: String,
    pub chunk_count: usize,
    pub pages_indexed: u32,
    pub checksum: String,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub struct QueryFilters {
    pub document_id: Option<String>,
    pub page: Option<u32>,
}

impl QueryFilters {
    pub fn admits(&self, chunk: &PdfChunk) -> bool {
        let document_ok = self
            .document_id
            .as_deref()
            .map_or(true, |id| id == chunk.document_id);
        let page_ok = self.page.map_or(true, |page| page == chunk.page_number);
        document_ok && page_ok
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    #[default]
    Lexical,
    Embedding,
    Hybrid,
}

impl SearchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lexical => "lexical",
            Self::Embedding => "embedding",
            Self::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = SearchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "lexical" | "keyword" => Ok(Self::Lexical),
            "embedding" | "vector" | "semantic" => Ok(Self::Embedding),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(SearchError::UnknownMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SearchQuery {
    pub text: String,
    pub top_k: usize,
    pub mode: SearchMode,
    pub filters: QueryFilters,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            top_k: 20,
            mode: SearchMode::default(),
            filters: QueryFilters::default(),
        }
    }

    /// Lowercased whitespace tokens of the query, duplicates removed in order.
    pub fn terms(&self) -> Vec<String> {
        let mut terms: Vec<String> = Vec::new();
        for token in self.text.split_whitespace() {
            let token = token.to_lowercase();
            if !terms.contains(&token) {
                terms.push(token);
            }
        }
        terms
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchCandidate {
    pub chunk: PdfChunk,
    pub score: f64,
    pub mode: SearchMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub query: String,
    pub mode: SearchMode,
    pub hits: Vec<SearchCandidate>,
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub chunking: ChunkingStrategy,
    pub chunk_window_words: usize,
    pub chunk_overlap_words: usize,
    pub chunk_max_chars: usize,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunking: ChunkingStrategy::FixedWindow,
            chunk_window_words: 300,
            chunk_overlap_words: 50,
            chunk_max_chars: 1_200,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(document_id: &str, page_number: u32) -> PdfChunk {
        PdfChunk {
            chunk_id: "c".to_string(),
            document_id: document_id.to_string(),
            document_name: "doc.pdf".to_string(),
            page_number,
            chunk_index: 0,
            section_path: None,
            text_raw: "text".to_string(),
            text_normalized: "text".to_string(),
        }
    }

    #[test]
    fn query_terms_are_lowercased_and_deduplicated() {
        let query = SearchQuery::new("  Asthma ASTHMA  J45.9 ");
        assert_eq!(query.terms(), vec!["asthma".to_string(), "j45.9".to_string()]);
    }

    #[test]
    fn search_mode_parses_aliases_and_rejects_unknown() {
        assert_eq!("Lexical".parse::<SearchMode>().ok(), Some(SearchMode::Lexical));
        assert_eq!("vector".parse::<SearchMode>().ok(), Some(SearchMode::Embedding));
        assert_eq!("hybrid".parse::<SearchMode>().ok(), Some(SearchMode::Hybrid));
        assert!(matches!(
            "fuzzy".parse::<SearchMode>(),
            Err(SearchError::UnknownMode(mode)) if mode == "fuzzy"
        ));
    }

    #[test]
    fn search_mode_serializes_snake_case() {
        let encoded = serde_json::to_string(&SearchMode::Embedding).expect("serializable");
        assert_eq!(encoded, "\"embedding\"");
    }

    #[test]
    fn filters_match_document_and_page() {
        let filters = QueryFilters {
            document_id: Some("doc-1".to_string()),
            page: Some(2),
        };
        assert!(filters.admits(&chunk("doc-1", 2)));
        assert!(!filters.admits(&chunk("doc-1", 3)));
        assert!(!filters.admits(&chunk("doc-2", 2)));
        assert!(QueryFilters::default().admits(&chunk("doc-2", 9)));
    }
}
