use crate::extractor::PageText;
use crate::models::{Document, DocumentSummary, PdfChunk, SearchCandidate, SearchQuery};
use crate::SearchError;
use async_trait::async_trait;

/// Owns documents and their chunks.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Indexes `chunks` for `document`, replacing any document with the same
    /// id. Returns the number of chunks now searchable for it.
    async fn insert(
        &self,
        document: Document,
        pages: Vec<PageText>,
        chunks: Vec<PdfChunk>,
    ) -> Result<usize, SearchError>;

    /// Removes a document, returning how many chunks it had.
    async fn remove(&self, document_id: &str) -> Result<Option<usize>, SearchError>;

    async fn documents(&self) -> Result<Vec<DocumentSummary>, SearchError>;

    async fn document_pages(&self, document_id: &str) -> Result<Option<Vec<PageText>>, SearchError>;

    async fn chunk_count(&self) -> Result<usize, SearchError>;
}

#[async_trait]
pub trait KeywordIndex: Send + Sync {
    async fn search_keyword(&self, query: &SearchQuery) -> Result<Vec<SearchCandidate>, SearchError>;
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Embeds query text with the same embedder the indexed chunks used.
    fn embed_query(&self, text: &str) -> Vec<f32>;

    async fn search_vector(
        &self,
        query_vector: &[f32],
        query: &SearchQuery,
    ) -> Result<Vec<SearchCandidate>, SearchError>;
}
