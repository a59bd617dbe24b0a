//! In-process index over chunk text.
//!
//! The whole index lives in an immutable [`IndexSnapshot`] behind
//! `RwLock<Arc<_>>`. Searches clone the `Arc` and release the lock straight
//! away; writers prepare the new document entry (tokens, embeddings) without
//! any lock and only hold the write lock to swap in the next snapshot. A
//! search therefore sees either all of a document or none of it.

use crate::embeddings::{cosine_similarity, CharacterNgramEmbedder, Embedder};
use crate::extractor::PageText;
use crate::models::{
    Document, DocumentSummary, PdfChunk, SearchCandidate, SearchMode, SearchQuery,
};
use crate::traits::{ChunkStore, KeywordIndex, VectorIndex};
use crate::SearchError;
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy)]
struct Posting {
    chunk: usize,
    frequency: usize,
}

#[derive(Debug)]
struct IndexedChunk {
    chunk: PdfChunk,
    embedding: Vec<f32>,
}

#[derive(Debug)]
struct DocumentEntry {
    document: Document,
    pages: Vec<PageText>,
    chunks: Vec<IndexedChunk>,
    /// Lowercased token -> chunks containing it.
    postings: HashMap<String, Vec<Posting>>,
}

impl DocumentEntry {
    fn build<E: Embedder>(
        document: Document,
        pages: Vec<PageText>,
        chunks: Vec<PdfChunk>,
        embedder: &E,
    ) -> Self {
        let mut postings: HashMap<String, Vec<Posting>> = HashMap::new();
        let mut indexed = Vec::with_capacity(chunks.len());

        for (position, chunk) in chunks.into_iter().enumerate() {
            let mut frequencies: HashMap<String, usize> = HashMap::new();
            for token in chunk.text_normalized.to_lowercase().split_whitespace() {
                *frequencies.entry(token.to_string()).or_default() += 1;
            }
            for (token, frequency) in frequencies {
                postings.entry(token).or_default().push(Posting {
                    chunk: position,
                    frequency,
                });
            }

            indexed.push(IndexedChunk {
                embedding: embedder.embed(&chunk.text_normalized),
                chunk,
            });
        }

        Self {
            document,
            pages,
            chunks: indexed,
            postings,
        }
    }

    fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            doc_id: self.document.document_id.clone(),
            doc_name: self.document.document_name.clone(),
            chunk_count: self.chunks.len(),
            pages_indexed: self.document.pages_indexed,
            checksum: self.document.checksum.clone(),
            ingested_at: self.document.ingested_at,
        }
    }

    /// Substring occurrence counts per chunk, summed over `terms`.
    ///
    /// Terms never contain whitespace, so counting inside each distinct token
    /// and multiplying by its frequency equals counting in the chunk text.
    fn lexical_scores(&self, terms: &[String]) -> Vec<usize> {
        let mut scores = vec![0usize; self.chunks.len()];
        for term in terms.iter().filter(|term| !term.is_empty()) {
            for (token, postings) in &self.postings {
                let hits = token.matches(term.as_str()).count();
                if hits == 0 {
                    continue;
                }
                for posting in postings {
                    scores[posting.chunk] += hits * posting.frequency;
                }
            }
        }
        scores
    }
}

#[derive(Debug, Default)]
struct IndexSnapshot {
    documents: Vec<Arc<DocumentEntry>>,
}

struct Ranked {
    score: f64,
    document_position: usize,
    chunk_index: u64,
    candidate: SearchCandidate,
}

fn rank(mut ranked: Vec<Ranked>, limit: usize) -> Vec<SearchCandidate> {
    ranked.sort_by(|left, right| {
        right
            .score
            .partial_cmp(&left.score)
            .unwrap_or(Ordering::Equal)
            .then(left.document_position.cmp(&right.document_position))
            .then(left.chunk_index.cmp(&right.chunk_index))
    });
    ranked
        .into_iter()
        .take(limit.max(1))
        .map(|item| item.candidate)
        .collect()
}

pub struct MemoryIndex<E = CharacterNgramEmbedder> {
    snapshot: RwLock<Arc<IndexSnapshot>>,
    embedder: E,
}

impl MemoryIndex<CharacterNgramEmbedder> {
    pub fn new() -> Self {
        Self::with_embedder(CharacterNgramEmbedder::default())
    }
}

impl Default for MemoryIndex<CharacterNgramEmbedder> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Embedder> MemoryIndex<E> {
    pub fn with_embedder(embedder: E) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(IndexSnapshot::default())),
            embedder,
        }
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    async fn current(&self) -> Arc<IndexSnapshot> {
        self.snapshot.read().await.clone()
    }
}

#[async_trait]
impl<E: Embedder> ChunkStore for MemoryIndex<E> {
    async fn insert(
        &self,
        document: Document,
        pages: Vec<PageText>,
        chunks: Vec<PdfChunk>,
    ) -> Result<usize, SearchError> {
        let entry = Arc::new(DocumentEntry::build(document, pages, chunks, &self.embedder));
        let indexed = entry.chunks.len();

        let mut guard = self.snapshot.write().await;
        let mut documents = guard.documents.clone();
        match documents
            .iter()
            .position(|existing| existing.document.document_id == entry.document.document_id)
        {
            Some(position) => documents[position] = entry,
            None => documents.push(entry),
        }
        *guard = Arc::new(IndexSnapshot { documents });

        Ok(indexed)
    }

    async fn remove(&self, document_id: &str) -> Result<Option<usize>, SearchError> {
        let mut guard = self.snapshot.write().await;
        let Some(position) = guard
            .documents
            .iter()
            .position(|entry| entry.document.document_id == document_id)
        else {
            return Ok(None);
        };

        let mut documents = guard.documents.clone();
        let removed = documents.remove(position);
        *guard = Arc::new(IndexSnapshot { documents });

        Ok(Some(removed.chunks.len()))
    }

    async fn documents(&self) -> Result<Vec<DocumentSummary>, SearchError> {
        let snapshot = self.current().await;
        Ok(snapshot.documents.iter().map(|entry| entry.summary()).collect())
    }

    async fn document_pages(&self, document_id: &str) -> Result<Option<Vec<PageText>>, SearchError> {
        let snapshot = self.current().await;
        Ok(snapshot
            .documents
            .iter()
            .find(|entry| entry.document.document_id == document_id)
            .map(|entry| entry.pages.clone()))
    }

    async fn chunk_count(&self) -> Result<usize, SearchError> {
        let snapshot = self.current().await;
        Ok(snapshot.documents.iter().map(|entry| entry.chunks.len()).sum())
    }
}

#[async_trait]
impl<E: Embedder> KeywordIndex for MemoryIndex<E> {
    async fn search_keyword(&self, query: &SearchQuery) -> Result<Vec<SearchCandidate>, SearchError> {
        let terms = query.terms();
        let snapshot = self.current().await;
        let mut ranked = Vec::new();

        for (document_position, entry) in snapshot.documents.iter().enumerate() {
            if !document_admitted(entry, query) {
                continue;
            }
            let scores = entry.lexical_scores(&terms);
            for (indexed, score) in entry.chunks.iter().zip(scores) {
                if score == 0 || !query.filters.admits(&indexed.chunk) {
                    continue;
                }
                ranked.push(Ranked {
                    score: score as f64,
                    document_position,
                    chunk_index: indexed.chunk.chunk_index,
                    candidate: SearchCandidate {
                        chunk: indexed.chunk.clone(),
                        score: score as f64,
                        mode: SearchMode::Lexical,
                    },
                });
            }
        }

        Ok(rank(ranked, query.top_k))
    }
}

#[async_trait]
impl<E: Embedder> VectorIndex for MemoryIndex<E> {
    fn embed_query(&self, text: &str) -> Vec<f32> {
        self.embedder.embed(text)
    }

    async fn search_vector(
        &self,
        query_vector: &[f32],
        query: &SearchQuery,
    ) -> Result<Vec<SearchCandidate>, SearchError> {
        let snapshot = self.current().await;
        let mut ranked = Vec::new();

        for (document_position, entry) in snapshot.documents.iter().enumerate() {
            if !document_admitted(entry, query) {
                continue;
            }
            for indexed in &entry.chunks {
                if !query.filters.admits(&indexed.chunk) {
                    continue;
                }
                let similarity = f64::from(cosine_similarity(query_vector, &indexed.embedding));
                if similarity <= 0.0 {
                    continue;
                }
                ranked.push(Ranked {
                    score: similarity,
                    document_position,
                    chunk_index: indexed.chunk.chunk_index,
                    candidate: SearchCandidate {
                        chunk: indexed.chunk.clone(),
                        score: similarity,
                        mode: SearchMode::Embedding,
                    },
                });
            }
        }

        Ok(rank(ranked, query.top_k))
    }
}

fn document_admitted(entry: &DocumentEntry, query: &SearchQuery) -> bool {
    query
        .filters
        .document_id
        .as_deref()
        .map_or(true, |id| id == entry.document.document_id)
}
