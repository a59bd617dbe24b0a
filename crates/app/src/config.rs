use clap::{ArgAction, Parser};
use pdfdex_core::{ChunkingStrategy, IngestionOptions, SearchMode};
use std::path::PathBuf;

const MIB: usize = 1024 * 1024;

#[derive(Debug, Clone, Parser)]
#[command(name = "pdfdex", version, about = "Upload PDFs and search their text over HTTP")]
pub struct Cli {
    /// Interface to bind.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// Where uploaded PDFs are stored and re-indexed from at start-up.
    #[arg(long, env = "PDF_DIR", default_value = "pdfs")]
    pub pdf_dir: PathBuf,

    /// Chunking strategy: fixed_window, paragraph or page.
    #[arg(long, env = "CHUNKING", default_value = "fixed_window")]
    pub chunking: ChunkingStrategy,

    /// Words per window for fixed_window chunking.
    #[arg(long, env = "CHUNK_WORDS", default_value_t = 300)]
    pub chunk_words: usize,

    /// Words shared by consecutive windows.
    #[arg(long, env = "CHUNK_OVERLAP_WORDS", default_value_t = 50)]
    pub chunk_overlap_words: usize,

    /// Character cap for paragraph and page chunking.
    #[arg(long, env = "CHUNK_MAX_CHARS", default_value_t = 1200)]
    pub chunk_max_chars: usize,

    /// Scoring used when a search does not ask for one.
    #[arg(long, env = "SEARCH_MODE", default_value = "lexical")]
    pub search_mode: SearchMode,

    #[arg(long, env = "DEFAULT_LIMIT", default_value_t = 20)]
    pub default_limit: usize,

    #[arg(long, env = "MAX_LIMIT", default_value_t = 100)]
    pub max_limit: usize,

    #[arg(long, env = "MAX_UPLOAD_MB", default_value_t = 100)]
    pub max_upload_mb: usize,

    /// Re-index the stored PDFs before reporting ready.
    #[arg(long, env = "REINDEX_ON_START", default_value_t = true, action = ArgAction::Set)]
    pub reindex_on_start: bool,

    /// Shorthand for `--reindex-on-start false`.
    #[arg(long, default_value_t = false)]
    pub no_reindex: bool,
}

/// Search settings applied to requests that leave them out.
#[derive(Debug, Clone, Copy)]
pub struct SearchDefaults {
    pub mode: SearchMode,
    pub limit: usize,
    pub max_limit: usize,
}

impl SearchDefaults {
    /// Requested limit, or the default, clamped to `1..=max_limit`.
    pub fn clamp_limit(&self, requested: Option<usize>) -> usize {
        let max = self.max_limit.max(1);
        requested.unwrap_or(self.limit).clamp(1, max)
    }
}

impl Default for SearchDefaults {
    fn default() -> Self {
        Self {
            mode: SearchMode::Lexical,
            limit: 20,
            max_limit: 100,
        }
    }
}

impl Cli {
    pub fn ingestion_options(&self) -> IngestionOptions {
        IngestionOptions {
            chunking: self.chunking,
            chunk_window_words: self.chunk_words,
            chunk_overlap_words: self.chunk_overlap_words,
            chunk_max_chars: self.chunk_max_chars,
        }
    }

    pub fn search_defaults(&self) -> SearchDefaults {
        SearchDefaults {
            mode: self.search_mode,
            limit: self.default_limit,
            max_limit: self.max_limit,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(MIB)
    }

    pub fn reindex_enabled(&self) -> bool {
        self.reindex_on_start && !self.no_reindex
    }
}
