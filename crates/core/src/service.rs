use crate::chunking::ChunkingConfig;
use crate::extractor::{LopdfExtractor, PdfExtractor};
use crate::ingest::{
    discover_pdf_files, parse_stored_file_name, prepare_document, IngestStage, IngestStatus,
    IngestionReport, PreparedDocument,
};
use crate::models::{DocumentSummary, IngestionOptions, SearchQuery, SearchResult};
use crate::orchestrator::SearchCoordinator;
use crate::outline::{chapter_context, ChapterContext, HeadingDetector};
use crate::stores::MemoryIndex;
use crate::traits::ChunkStore;
use crate::{IngestError, SearchError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const NEEDS_OCR_MESSAGE: &str =
    "No extractable text found. The PDF looks scanned or image-only and needs OCR first.";

#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub bytes: Vec<u8>,
    pub document_name: String,
    /// Generated when absent.
    pub document_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DirectoryIngestionReport {
    pub reports: Vec<IngestionReport>,
    pub skipped_files: Vec<SkippedPdf>,
}

impl DirectoryIngestionReport {
    pub fn chunks_indexed(&self) -> usize {
        self.reports.iter().map(|report| report.chunks_indexed).sum()
    }
}

/// A parsed and chunked PDF that has not been indexed yet.
#[derive(Debug)]
pub struct PendingIngest {
    document_id: String,
    document_name: String,
    prepared: PreparedDocument,
}

impl PendingIngest {
    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn chunk_count(&self) -> usize {
        self.prepared.chunks.len()
    }
}

/// Upload, search and chapter lookups over one shared in-memory index.
pub struct PdfSearchService {
    index: Arc<MemoryIndex>,
    coordinator: SearchCoordinator<MemoryIndex>,
    extractor: Arc<dyn PdfExtractor>,
    detector: Arc<HeadingDetector>,
    chunking: ChunkingConfig,
}

impl PdfSearchService {
    pub fn new(options: IngestionOptions) -> Result<Self, IngestError> {
        let chunking = ChunkingConfig::from(options);
        chunking.validate()?;

        let index = Arc::new(MemoryIndex::new());
        Ok(Self {
            coordinator: SearchCoordinator::new(Arc::clone(&index)),
            index,
            extractor: Arc::new(LopdfExtractor),
            detector: Arc::new(HeadingDetector::new()?),
            chunking,
        })
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn PdfExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Runs one PDF through extract, chunk and index.
    ///
    /// Never returns an error: every outcome, including a parser crash, ends
    /// in a report. A failed document leaves the index untouched, while a
    /// textless one is still recorded so it can be listed and deleted.
    pub async fn ingest(&self, request: IngestRequest) -> IngestionReport {
        match self.prepare(request).await {
            Ok(pending) => self.commit(pending).await,
            Err(report) => report,
        }
    }

    /// Extracts and chunks a PDF without touching the index.
    ///
    /// Lets a caller persist the upload between parsing and indexing, and
    /// drop the result if that fails.
    pub async fn prepare(&self, request: IngestRequest) -> Result<PendingIngest, IngestionReport> {
        let IngestRequest {
            bytes,
            document_name,
            document_id,
        } = request;
        let document_id = document_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        debug!(doc_id = %document_id, doc_name = %document_name, bytes = bytes.len(), stage = %IngestStage::Received, "ingestion stage");

        let extractor = Arc::clone(&self.extractor);
        let detector = Arc::clone(&self.detector);
        let chunking = self.chunking;
        let id = document_id.clone();
        let name = document_name.clone();
        let prepared = tokio::task::spawn_blocking(move || {
            prepare_document(extractor.as_ref(), &detector, &chunking, &bytes, &id, &name)
        })
        .await
        .map_err(IngestError::from)
        .and_then(|result| result);

        match prepared {
            Ok(prepared) => Ok(PendingIngest {
                document_id,
                document_name,
                prepared,
            }),
            Err(error) => {
                warn!(doc_id = %document_id, doc_name = %document_name, error = %error, "ingestion failed");
                Err(IngestionReport::failed(&document_id, &document_name, &error))
            }
        }
    }

    /// Indexes a prepared document, replacing any earlier version with the same id.
    pub async fn commit(&self, pending: PendingIngest) -> IngestionReport {
        let PendingIngest {
            document_id,
            document_name,
            prepared,
        } = pending;
        let pages_with_text = prepared.document.pages_indexed;
        debug!(doc_id = %document_id, stage = %IngestStage::Indexing, chunks = prepared.chunks.len(), "ingestion stage");
        let indexed = match self
            .index
            .insert(prepared.document, prepared.pages, prepared.chunks)
            .await
        {
            Ok(indexed) => indexed,
            Err(error) => {
                warn!(doc_id = %document_id, error = %error, "indexing failed");
                return IngestionReport {
                    doc_id: document_id,
                    doc_name: document_name,
                    status: IngestStatus::Failed,
                    chunks_indexed: 0,
                    pages_with_text: 0,
                    message: format!("Failed to index PDF: {error}"),
                };
            }
        };

        let (status, message) = if indexed == 0 {
            warn!(doc_id = %document_id, doc_name = %document_name, "no extractable text");
            (IngestStatus::ZeroChunks, NEEDS_OCR_MESSAGE.to_string())
        } else {
            info!(doc_id = %document_id, doc_name = %document_name, chunks = indexed, pages = pages_with_text, "document indexed");
            (
                IngestStatus::Done,
                format!("Indexed {indexed} chunks from {pages_with_text} pages."),
            )
        };

        IngestionReport {
            doc_id: document_id,
            doc_name: document_name,
            status,
            chunks_indexed: indexed,
            pages_with_text,
            message,
        }
    }

    /// Indexes a stored PDF, recovering its id and name from the file name.
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestionReport, IngestError> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| IngestError::InvalidArgument(format!("not a file: {}", path.display())))?;
        let (document_id, document_name) = parse_stored_file_name(file_name).ok_or_else(|| {
            IngestError::InvalidArgument(format!("cannot derive a document id from {file_name}"))
        })?;

        let bytes = tokio::fs::read(path).await?;
        Ok(self
            .ingest(IngestRequest {
                bytes,
                document_name,
                document_id: Some(document_id),
            })
            .await)
    }

    /// Re-indexes every PDF under `dir`. Unreadable files are skipped, never fatal.
    pub async fn ingest_directory(&self, dir: &Path) -> DirectoryIngestionReport {
        let mut summary = DirectoryIngestionReport::default();

        for path in discover_pdf_files(dir) {
            match self.ingest_file(&path).await {
                Ok(report) => summary.reports.push(report),
                Err(error) => {
                    warn!(path = %path.display(), error = %error, "skipping stored pdf");
                    summary.skipped_files.push(SkippedPdf {
                        path,
                        reason: error.to_string(),
                    });
                }
            }
        }

        info!(
            dir = %dir.display(),
            documents = summary.reports.len(),
            skipped = summary.skipped_files.len(),
            chunks = summary.chunks_indexed(),
            "directory re-indexed"
        );
        summary
    }

    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResult, SearchError> {
        self.coordinator.search(query).await
    }

    pub async fn documents(&self) -> Result<Vec<DocumentSummary>, SearchError> {
        self.index.documents().await
    }

    pub async fn document(&self, document_id: &str) -> Result<Option<DocumentSummary>, SearchError> {
        Ok(self
            .index
            .documents()
            .await?
            .into_iter()
            .find(|summary| summary.doc_id == document_id))
    }

    /// Returns the number of chunks removed, or `None` for an unknown id.
    pub async fn remove(&self, document_id: &str) -> Result<Option<usize>, SearchError> {
        let removed = self.index.remove(document_id).await?;
        if let Some(chunks) = removed {
            info!(doc_id = document_id, chunks, "document removed");
        }
        Ok(removed)
    }

    pub async fn chunk_count(&self) -> Result<usize, SearchError> {
        self.index.chunk_count().await
    }

    /// Breadcrumb and paragraph around `query` on `page` of a document.
    pub async fn chapter(
        &self,
        document_id: &str,
        page: u32,
        query: &str,
    ) -> Result<Option<ChapterContext>, SearchError> {
        let Some(pages) = self.index.document_pages(document_id).await? else {
            return Ok(None);
        };
        Ok(Some(chapter_context(&self.detector, &pages, page, query)))
    }
}
