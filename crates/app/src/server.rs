use crate::config::{Cli, SearchDefaults};
use crate::handlers;
use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use chrono::Utc;
use pdfdex_core::PdfSearchService;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared by every request handler.
pub struct AppState {
    service: Arc<PdfSearchService>,
    pdf_dir: PathBuf,
    ready: AtomicBool,
    started_at: Instant,
    search_defaults: SearchDefaults,
}

impl AppState {
    pub fn new(
        service: Arc<PdfSearchService>,
        pdf_dir: PathBuf,
        search_defaults: SearchDefaults,
    ) -> Self {
        Self {
            service,
            pdf_dir,
            ready: AtomicBool::new(false),
            started_at: Instant::now(),
            search_defaults,
        }
    }

    pub fn service(&self) -> &PdfSearchService {
        &self.service
    }

    pub fn pdf_dir(&self) -> &Path {
        &self.pdf_dir
    }

    pub fn search_defaults(&self) -> SearchDefaults {
        self.search_defaults
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

pub fn build_router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let pdfs = ServeDir::new(state.pdf_dir());

    Router::new()
        .route("/", get(handlers::index_page))
        .route("/health", get(handlers::health))
        .route(
            "/upload",
            post(handlers::upload).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/search", get(handlers::search))
        .route("/documents", get(handlers::list_documents))
        .route("/documents/{doc_id}", delete(handlers::delete_document))
        .route("/chapter", get(handlers::chapter))
        .nest_service("/pdfs", pdfs)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Re-indexes the stored PDFs, then opens the API.
pub async fn warm_up(state: Arc<AppState>) {
    let started = Instant::now();
    let summary = state.service().ingest_directory(state.pdf_dir()).await;

    for skipped in &summary.skipped_files {
        warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
    }
    let failed = summary
        .reports
        .iter()
        .filter(|report| report.is_failure())
        .count();

    info!(
        documents = summary.reports.len(),
        failed,
        chunks = summary.chunks_indexed(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "start-up re-index finished"
    );
    state.mark_ready();
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let service = PdfSearchService::new(cli.ingestion_options())
        .context("invalid ingestion configuration")?;
    tokio::fs::create_dir_all(&cli.pdf_dir)
        .await
        .with_context(|| format!("cannot create pdf dir {}", cli.pdf_dir.display()))?;

    let state = Arc::new(AppState::new(
        Arc::new(service),
        cli.pdf_dir.clone(),
        cli.search_defaults(),
    ));

    if cli.reindex_enabled() {
        tokio::spawn(warm_up(Arc::clone(&state)));
    } else {
        state.mark_ready();
    }

    let address = cli.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("cannot bind {address}"))?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        address = %address,
        pdf_dir = %cli.pdf_dir.display(),
        chunking = %cli.chunking,
        search_mode = %cli.search_mode,
        started_at = %Utc::now().to_rfc3339(),
        "pdfdex listening"
    );

    axum::serve(listener, build_router(state, cli.max_upload_bytes()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("pdfdex stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(error = %error, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
