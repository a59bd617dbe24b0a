pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures;
pub mod highlight;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod outline;
pub mod service;
pub mod stores;
pub mod traits;

pub use chunking::{build_chunks, normalize_whitespace, ChunkingConfig, ChunkingStrategy};
pub use embeddings::{CharacterNgramEmbedder, Embedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{IngestError, SearchError};
pub use extractor::{extract_page_texts, LopdfExtractor, PageText, PdfExtractor};
pub use highlight::{highlight_snippet, mark_terms, DEFAULT_SNIPPET_CHARS};
pub use ingest::{
    discover_pdf_files, has_pdf_extension, stored_file_name, validate_document_id, IngestStatus,
    IngestionReport,
};
pub use models::{
    Document, DocumentSummary, IngestionOptions, PdfChunk, QueryFilters, SearchCandidate,
    SearchMode, SearchQuery, SearchResult,
};
pub use orchestrator::SearchCoordinator;
pub use outline::{ChapterContext, HeadingDetector};
pub use service::{
    DirectoryIngestionReport, IngestRequest, PdfSearchService, PendingIngest, SkippedPdf,
};
pub use stores::MemoryIndex;
pub use traits::{ChunkStore, KeywordIndex, VectorIndex};
