use crate::chunking::{build_chunks, ChunkingConfig};
use crate::extractor::{PageText, PdfExtractor};
use crate::models::{Document, PdfChunk};
use crate::outline::HeadingDetector;
use crate::IngestError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

const MAX_DOCUMENT_ID_LEN: usize = 64;
const STORED_NAME_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IngestStage {
    Received,
    Extracting,
    Chunking,
    Indexing,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Received => "received",
            Self::Extracting => "extracting",
            Self::Chunking => "chunking",
            Self::Indexing => "indexing",
        })
    }
}

/// Terminal state of one ingestion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    Done,
    /// The PDF parsed but had no text layer; usually a scan that needs OCR.
    ZeroChunks,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestionReport {
    pub doc_id: String,
    pub doc_name: String,
    pub status: IngestStatus,
    pub chunks_indexed: usize,
    pub pages_with_text: u32,
    pub message: String,
}

impl IngestionReport {
    pub fn failed(doc_id: &str, doc_name: &str, error: &IngestError) -> Self {
        Self {
            doc_id: doc_id.to_string(),
            doc_name: doc_name.to_string(),
            status: IngestStatus::Failed,
            chunks_indexed: 0,
            pages_with_text: 0,
            message: format!("Failed to parse PDF: {error}"),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.status == IngestStatus::Failed
    }
}

#[derive(Debug)]
pub struct PreparedDocument {
    pub document: Document,
    pub pages: Vec<PageText>,
    pub chunks: Vec<PdfChunk>,
}

/// Extracts and chunks one PDF. CPU bound; callers run it off the async runtime.
pub fn prepare_document(
    extractor: &dyn PdfExtractor,
    detector: &HeadingDetector,
    config: &ChunkingConfig,
    bytes: &[u8],
    document_id: &str,
    document_name: &str,
) -> Result<PreparedDocument, IngestError> {
    debug!(doc_id = document_id, stage = %IngestStage::Extracting, "ingestion stage");
    let pages = extractor.extract_pages(bytes)?;

    let document = Document {
        document_id: document_id.to_string(),
        document_name: document_name.to_string(),
        checksum: digest_bytes(bytes),
        byte_len: bytes.len() as u64,
        pages_indexed: u32::try_from(pages.len()).unwrap_or(u32::MAX),
        ingested_at: Utc::now(),
    };

    debug!(doc_id = document_id, stage = %IngestStage::Chunking, pages = pages.len(), "ingestion stage");
    let chunks = build_chunks(&document, &pages, config, detector);

    Ok(PreparedDocument {
        document,
        pages,
        chunks,
    })
}

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub fn has_pdf_extension(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// Ids end up in file names and URLs, so only ASCII letters, digits and `-`.
pub fn validate_document_id(document_id: &str) -> Result<(), IngestError> {
    let valid = !document_id.is_empty()
        && document_id.len() <= MAX_DOCUMENT_ID_LEN
        && document_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-');

    if valid {
        Ok(())
    } else {
        Err(IngestError::InvalidArgument(format!(
            "document id must be 1-{MAX_DOCUMENT_ID_LEN} characters of [A-Za-z0-9-]: {document_id:?}"
        )))
    }
}

/// File name an uploaded PDF is stored under: `<id>__<sanitised name>`.
pub fn stored_file_name(document_id: &str, document_name: &str) -> String {
    let mut name: String = document_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if !has_pdf_extension(&name) {
        name.push_str(".pdf");
    }
    format!("{document_id}{STORED_NAME_SEPARATOR}{name}")
}

/// Inverse of [`stored_file_name`]; plain `<id>.pdf` names are accepted too.
pub fn parse_stored_file_name(file_name: &str) -> Option<(String, String)> {
    if let Some((id, name)) = file_name.split_once(STORED_NAME_SEPARATOR) {
        if validate_document_id(id).is_ok() && !name.is_empty() {
            return Some((id.to_string(), name.to_string()));
        }
    }

    let stem = Path::new(file_name).file_stem()?.to_str()?;
    validate_document_id(stem).ok()?;
    Some((stem.to_string(), file_name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::ChunkingStrategy;
    use crate::extractor::LopdfExtractor;
    use crate::fixtures::{text_pdf, textless_pdf};
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::tempdir;

    fn config() -> ChunkingConfig {
        ChunkingConfig {
            strategy: ChunkingStrategy::FixedWindow,
            window_words: 4,
            overlap_words: 0,
            max_chars: 200,
        }
    }

    #[test]
    fn discover_pdf_files_is_recursive() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        File::create(base.join("a.pdf")).and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(nested.join("b.PDF"))
            .and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(base.join("notes.txt")).and_then(|mut file| file.write_all(b"text"))?;

        let files = discover_pdf_files(base);
        assert_eq!(files.len(), 2);
        Ok(())
    }

    #[test]
    fn checksum_is_reproducible() {
        assert_eq!(digest_bytes(b"abc"), digest_bytes(b"abc"));
        assert_ne!(digest_bytes(b"abc"), digest_bytes(b"abd"));
    }

    #[test]
    fn prepared_document_carries_pages_and_chunks() {
        let pdf = text_pdf(&[&["one two three four five"], &["six seven"]]);
        let detector = HeadingDetector::new().expect("patterns");

        let prepared = prepare_document(&LopdfExtractor, &detector, &config(), &pdf, "doc-1", "a.pdf")
            .expect("text pdf should prepare");

        assert_eq!(prepared.document.pages_indexed, 2);
        assert_eq!(prepared.document.byte_len, pdf.len() as u64);
        assert_eq!(prepared.chunks.len(), 3);
        assert!(prepared.chunks.iter().all(|chunk| chunk.document_id == "doc-1"));
    }

    #[test]
    fn textless_pdf_prepares_with_zero_chunks() {
        let detector = HeadingDetector::new().expect("patterns");
        let prepared = prepare_document(
            &LopdfExtractor,
            &detector,
            &config(),
            &textless_pdf(1),
            "doc-2",
            "scan.pdf",
        )
        .expect("scans are not failures");

        assert!(prepared.pages.is_empty());
        assert!(prepared.chunks.is_empty());
    }

    #[test]
    fn broken_pdf_fails_to_prepare() {
        let detector = HeadingDetector::new().expect("patterns");
        let result = prepare_document(
            &LopdfExtractor,
            &detector,
            &config(),
            b"not a pdf",
            "doc-3",
            "broken.pdf",
        );
        assert!(matches!(result, Err(IngestError::PdfParse(_))));
    }

    #[test]
    fn document_ids_are_restricted() {
        assert!(validate_document_id("3f2a-91bc").is_ok());
        assert!(validate_document_id("").is_err());
        assert!(validate_document_id("../etc").is_err());
        assert!(validate_document_id("a__b").is_err());
        assert!(validate_document_id(&"x".repeat(65)).is_err());
    }

    #[test]
    fn stored_names_round_trip() {
        let stored = stored_file_name("doc-1", "ICD 10 (NL) v2.pdf");
        assert_eq!(stored, "doc-1__ICD_10__NL__v2.pdf");
        assert_eq!(
            parse_stored_file_name(&stored),
            Some(("doc-1".to_string(), "ICD_10__NL__v2.pdf".to_string()))
        );
        assert_eq!(stored_file_name("doc-1", "notes"), "doc-1__notes.pdf");
        assert_eq!(
            parse_stored_file_name("legacy-id.pdf"),
            Some(("legacy-id".to_string(), "legacy-id.pdf".to_string()))
        );
        assert_eq!(parse_stored_file_name("bad id.pdf"), None);
    }

    #[test]
    fn pdf_extension_check_ignores_case() {
        assert!(has_pdf_extension("Manual.PDF"));
        assert!(!has_pdf_extension("manual.pdf.exe"));
        assert!(!has_pdf_extension("manual"));
    }
}
