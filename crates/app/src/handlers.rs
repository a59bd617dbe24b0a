use crate::server::AppState;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use pdfdex_core::{
    has_pdf_extension, highlight_snippet, stored_file_name, validate_document_id, ChapterContext,
    DocumentSummary, IngestRequest, QueryFilters, SearchError, SearchMode,
    SearchQuery, DEFAULT_SNIPPET_CHARS,
};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::Path as FsPath;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const INDEX_HTML: &str = include_str!("../static/index.html");
const RETRY_AFTER_SECS: &str = "5";

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// JSON error response: `{"error":{"code","message"}}`.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        if self.status == StatusCode::SERVICE_UNAVAILABLE {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS));
        }
        response
    }
}

impl From<SearchError> for AppError {
    fn from(error: SearchError) -> Self {
        match error {
            SearchError::EmptyQuery | SearchError::UnknownMode(_) => bad_request(error.to_string()),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

fn starting() -> AppError {
    AppError {
        status: StatusCode::SERVICE_UNAVAILABLE,
        code: "starting",
        message: "The index is still warming up; retry shortly.".to_string(),
    }
}

fn ensure_ready(state: &AppState) -> Result<(), AppError> {
    if state.is_ready() {
        Ok(())
    } else {
        Err(starting())
    }
}

pub async fn index_page() -> Html<&'static str> {
    Html(INDEX_HTML)
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    documents: usize,
    indexed_chunks: usize,
    uptime_secs: u64,
}

/// `200 ok` once the start-up re-index finished, `503 starting` before.
pub async fn health(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let service = state.service();
    let documents = service.documents().await?.len();
    let indexed_chunks = service.chunk_count().await?;

    let (status_code, status) = if state.is_ready() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "starting")
    };

    let body = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        documents,
        indexed_chunks,
        uptime_secs: state.uptime().as_secs(),
    };
    let mut response = (status_code, Json(body)).into_response();
    if status_code == StatusCode::SERVICE_UNAVAILABLE {
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS));
    }
    Ok(response)
}

/// Multipart upload: a `file` part (a `.pdf`) and an optional `doc_id` part.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    ensure_ready(&state)?;

    let mut file: Option<(String, Vec<u8>)> = None;
    let mut requested_id: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Multipart error: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("Failed to read file: {e}")))?;
                file = Some((file_name, Vec::from(bytes)));
            }
            "doc_id" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("Failed to read doc_id: {e}")))?;
                let value = value.trim().to_string();
                if !value.is_empty() {
                    requested_id = Some(value);
                }
            }
            _ => {}
        }
    }

    let (file_name, bytes) = file.ok_or_else(|| bad_request("No file provided"))?;
    if !has_pdf_extension(&file_name) {
        return Err(bad_request("Only PDF files are accepted."));
    }
    if let Some(id) = &requested_id {
        validate_document_id(id).map_err(|error| bad_request(error.to_string()))?;
    }
    let doc_id = requested_id.unwrap_or_else(|| Uuid::new_v4().to_string());

    let service = state.service();
    let previous = service.document(&doc_id).await?;

    // Not a .pdf name, so a crash mid-upload never gets re-indexed.
    let staging = state
        .pdf_dir()
        .join(format!(".{doc_id}.{}.upload", Uuid::new_v4()));
    if let Err(error) = tokio::fs::write(&staging, &bytes).await {
        warn!(doc_id = %doc_id, path = %staging.display(), error = %error, "failed to stage pdf");
        remove_stored_file(&staging).await;
        return Err(internal(format!("Failed to store PDF: {error}")));
    }

    let pending = match service
        .prepare(IngestRequest {
            bytes,
            document_name: file_name.clone(),
            document_id: Some(doc_id.clone()),
        })
        .await
    {
        Ok(pending) => pending,
        Err(report) => {
            remove_stored_file(&staging).await;
            return Ok((StatusCode::UNPROCESSABLE_ENTITY, Json(report)).into_response());
        }
    };

    let stored = state.pdf_dir().join(stored_file_name(&doc_id, &file_name));
    if let Err(error) = tokio::fs::rename(&staging, &stored).await {
        warn!(doc_id = %doc_id, path = %stored.display(), error = %error, "failed to store pdf");
        remove_stored_file(&staging).await;
        return Err(internal(format!("Failed to store PDF: {error}")));
    }

    let report = service.commit(pending).await;
    let old = previous.map(|previous| {
        state
            .pdf_dir()
            .join(stored_file_name(&previous.doc_id, &previous.doc_name))
    });
    if report.is_failure() {
        if old.as_ref() != Some(&stored) {
            remove_stored_file(&stored).await;
        }
        return Err(internal(report.message));
    }
    if let Some(old) = old.filter(|old| *old != stored) {
        remove_stored_file(&old).await;
    }

    info!(doc_id = %doc_id, doc_name = %file_name, status = ?report.status, chunks = report.chunks_indexed, "upload handled");
    Ok((StatusCode::OK, Json(report)).into_response())
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    q: Option<String>,
    doc_id: Option<String>,
    page: Option<u32>,
    limit: Option<usize>,
    mode: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchHitView {
    pub chunk_id: String,
    pub doc_id: String,
    pub doc_name: String,
    pub page: u32,
    pub chunk_index: u64,
    pub section: Option<String>,
    pub snippet: String,
    pub pdf_url: String,
    pub score: f64,
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<SearchHitView>>, AppError> {
    ensure_ready(&state)?;

    let defaults = state.search_defaults();
    let mode = match params.mode.as_deref().map(str::trim) {
        None | Some("") => defaults.mode,
        Some(raw) => raw.parse::<SearchMode>()?,
    };

    let mut query = SearchQuery::new(params.q.unwrap_or_default());
    query.top_k = defaults.clamp_limit(params.limit);
    query.mode = mode;
    query.filters = QueryFilters {
        document_id: params.doc_id.filter(|id| !id.is_empty()),
        page: params.page,
    };

    let result = state.service().search(&query).await?;
    let terms = query.terms();

    let hits = result
        .hits
        .into_iter()
        .map(|hit| {
            let chunk = hit.chunk;
            SearchHitView {
                snippet: highlight_snippet(&chunk.text_normalized, &terms, DEFAULT_SNIPPET_CHARS),
                pdf_url: format!(
                    "/pdfs/{}#page={}",
                    stored_file_name(&chunk.document_id, &chunk.document_name),
                    chunk.page_number
                ),
                chunk_id: chunk.chunk_id,
                doc_id: chunk.document_id,
                doc_name: chunk.document_name,
                page: chunk.page_number,
                chunk_index: chunk.chunk_index,
                section: chunk.section_path,
                score: hit.score,
            }
        })
        .collect();

    Ok(Json(hits))
}

pub async fn list_documents(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<DocumentSummary>>, AppError> {
    ensure_ready(&state)?;
    Ok(Json(state.service().documents().await?))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub doc_id: String,
    pub deleted_chunks: usize,
}

pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    Path(doc_id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    ensure_ready(&state)?;

    let service = state.service();
    let summary = service
        .document(&doc_id)
        .await?
        .ok_or_else(|| not_found("Document not found."))?;
    let deleted_chunks = service
        .remove(&doc_id)
        .await?
        .ok_or_else(|| not_found("Document not found."))?;

    remove_stored_file(
        &state
            .pdf_dir()
            .join(stored_file_name(&summary.doc_id, &summary.doc_name)),
    )
    .await;

    Ok(Json(DeleteResponse {
        doc_id,
        deleted_chunks,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ChapterParams {
    doc_id: Option<String>,
    page: Option<u32>,
    q: Option<String>,
}

pub async fn chapter(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ChapterParams>,
) -> Result<Json<ChapterContext>, AppError> {
    ensure_ready(&state)?;

    let doc_id = params
        .doc_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| bad_request("doc_id is required"))?;
    let page = params.page.unwrap_or(1).max(1);
    let query = params.q.unwrap_or_default();

    state
        .service()
        .chapter(&doc_id, page, &query)
        .await?
        .map(Json)
        .ok_or_else(|| not_found("Document not found."))
}

async fn remove_stored_file(path: &FsPath) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(error) if error.kind() == ErrorKind::NotFound => {}
        Err(error) => warn!(path = %path.display(), error = %error, "failed to remove stored pdf"),
    }
}
