//! Local-socket HTTP RPC surface.
//!
//! A thin axum layer over the search engine and the scheduler: handlers
//! deserialize JSON, delegate, and map failures onto HTTP statuses (400
//! for malformed requests, 503 while the index is not ready, 500 for
//! internal errors), always with a JSON `{"error": ...}` body. Unknown
//! request fields are ignored.

pub mod socket;

use crate::config::Settings;
use crate::error::IndexError;
use crate::index::{IndexKind, Requirements};
use crate::scheduler::{IndexScheduler, Progress, ProgressSnapshot};
use crate::search::{
    CountersSnapshot, SearchEngine, SearchOptions, SearchResponse, SymbolInfo, TreeOptions,
    TreeResponse,
};
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<StateInner>,
}

struct StateInner {
    settings: Arc<Settings>,
    engine: Arc<SearchEngine>,
    scheduler: Arc<IndexScheduler>,
    progress: Arc<Progress>,
    started: Instant,
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        settings: Arc<Settings>,
        engine: Arc<SearchEngine>,
        scheduler: Arc<IndexScheduler>,
        shutdown: CancellationToken,
    ) -> Self {
        let progress = scheduler.progress();
        Self {
            inner: Arc::new(StateInner {
                settings,
                engine,
                scheduler,
                progress,
                started: Instant::now(),
                shutdown,
            }),
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }
}

/// JSON error body returned by the API.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Maps internal failures onto JSON HTTP responses.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<IndexError> for ApiError {
    fn from(err: IndexError) -> Self {
        let status = match &err {
            IndexError::IndexNotReady => StatusCode::SERVICE_UNAVAILABLE,
            IndexError::ConfigInvalid { .. } | IndexError::InvalidId { .. } => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("[server] internal error: {err}");
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

/// `Json` extractor whose rejection is our 400 JSON body instead of
/// axum's plain-text default.
struct ApiJson<T>(T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    S: Send + Sync,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(ApiError::bad_request(rejection.body_text())),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/search", post(search))
        .route("/symbol", post(symbol))
        .route("/definition", post(definition))
        .route("/references", post(references))
        .route("/tree", post(tree))
        .route("/reindex", post(reindex))
        .route("/ping", get(ping))
        .route("/stats", get(stats))
        .route("/shutdown", post(shutdown))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    pattern: String,
    #[serde(default)]
    options: SearchOptions,
    #[serde(default)]
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct PatternRequest {
    pattern: String,
    #[serde(default)]
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct SymbolRequest {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ReindexRequest {
    #[serde(default)]
    path: Option<String>,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    ready: bool,
    file_count: usize,
    symbol_count: usize,
    indexing_active: bool,
    progress: ProgressSnapshot,
}

#[derive(Debug, Serialize)]
struct SymbolResponse {
    symbol: Option<SymbolInfo>,
}

#[derive(Debug, Serialize)]
struct ReindexAck {
    queued: bool,
}

#[derive(Debug, Serialize)]
struct PingResponse {
    uptime_secs: u64,
    version: &'static str,
}

#[derive(Debug, Serialize)]
struct MemoryStats {
    index_bytes: usize,
    process_rss_bytes: u64,
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    file_count: usize,
    symbol_count: usize,
    reference_count: usize,
    shingle_count: usize,
    build_duration_ms: u64,
    memory: MemoryStats,
    counters: CountersSnapshot,
    progress: ProgressSnapshot,
}

#[derive(Debug, Serialize)]
struct ShutdownAck {
    shutting_down: bool,
}

fn require_ready(state: &AppState) -> Result<(), ApiError> {
    if state.inner.progress.ready() {
        Ok(())
    } else {
        Err(ApiError::from(IndexError::IndexNotReady))
    }
}

async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let (file_count, symbol_count) = index_counts(&state)?;
    Ok(Json(StatusResponse {
        ready: state.inner.progress.ready(),
        file_count,
        symbol_count,
        indexing_active: state.inner.progress.indexing_active(),
        progress: state.inner.progress.snapshot(),
    }))
}

async fn search(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    require_ready(&state)?;
    let engine = Arc::clone(&state.inner.engine);
    let response = tokio::task::spawn_blocking(move || {
        engine.search(&request.pattern, &request.options, request.max_results)
    })
    .await
    .map_err(|e| ApiError::from(IndexError::Internal(e.to_string())))??;
    Ok(Json(response))
}

async fn symbol(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SymbolRequest>,
) -> Result<Json<SymbolResponse>, ApiError> {
    let symbol = state.inner.engine.resolve_symbol(&request.id)?;
    Ok(Json(SymbolResponse { symbol }))
}

async fn definition(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<PatternRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    require_ready(&state)?;
    let engine = Arc::clone(&state.inner.engine);
    let response = tokio::task::spawn_blocking(move || {
        engine.definition(&request.pattern, request.max_results)
    })
    .await
    .map_err(|e| ApiError::from(IndexError::Internal(e.to_string())))??;
    Ok(Json(response))
}

async fn references(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<PatternRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    require_ready(&state)?;
    let engine = Arc::clone(&state.inner.engine);
    let response = tokio::task::spawn_blocking(move || {
        engine.references(&request.pattern, request.max_results)
    })
    .await
    .map_err(|e| ApiError::from(IndexError::Internal(e.to_string())))??;
    Ok(Json(response))
}

async fn tree(
    State(state): State<AppState>,
    ApiJson(options): ApiJson<TreeOptions>,
) -> Result<Json<TreeResponse>, ApiError> {
    require_ready(&state)?;
    let engine = Arc::clone(&state.inner.engine);
    let response = tokio::task::spawn_blocking(move || engine.tree(&options))
        .await
        .map_err(|e| ApiError::from(IndexError::Internal(e.to_string())))??;
    Ok(Json(response))
}

/// Fire-and-forget: acknowledges immediately, indexing proceeds in the
/// background on a plain thread (the walk blocks on queue backpressure).
async fn reindex(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ReindexRequest>,
) -> Json<ReindexAck> {
    let scheduler = Arc::clone(&state.inner.scheduler);
    let root = state.inner.settings.project_root.clone();

    std::thread::spawn(move || match request.path {
        None => scheduler.walk_project(),
        Some(path) => {
            let absolute = if std::path::Path::new(&path).is_absolute() {
                std::path::PathBuf::from(path)
            } else {
                root.join(path)
            };
            if absolute.is_dir() {
                scheduler.walk_subtree(&absolute);
            } else {
                scheduler.enqueue(absolute);
            }
        }
    });

    Json(ReindexAck { queued: true })
}

async fn ping(State(state): State<AppState>) -> Json<PingResponse> {
    Json(PingResponse {
        uptime_secs: state.inner.started.elapsed().as_secs(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, ApiError> {
    let engine = &state.inner.engine;
    let deadline = engine.lock_deadline();
    let view = engine
        .coordinator()
        .acquire_read(Requirements::all(), deadline)?;

    let response = StatsResponse {
        file_count: view.locations().map_or(0, |l| l.len()),
        symbol_count: view.symbols().map_or(0, |s| s.symbol_count()),
        reference_count: view.references().map_or(0, |r| r.reference_count()),
        shingle_count: view.trigram().map_or(0, |t| t.shingle_count()),
        build_duration_ms: state.inner.progress.build_duration_ms(),
        memory: MemoryStats {
            index_bytes: state.inner.progress.approx_bytes(),
            process_rss_bytes: process_rss(),
        },
        counters: engine.counters().snapshot(),
        progress: state.inner.progress.snapshot(),
    };
    Ok(Json(response))
}

/// Responds, then cancels the serve loop; in-flight responses finish
/// under graceful shutdown and the socket is unlinked by the caller.
async fn shutdown(State(state): State<AppState>) -> Json<ShutdownAck> {
    crate::log_event!("server", "shutdown requested");
    let token = state.inner.shutdown.clone();
    tokio::spawn(async move {
        // Give the response a moment to flush before the listener closes.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        token.cancel();
    });
    Json(ShutdownAck {
        shutting_down: true,
    })
}

fn index_counts(state: &AppState) -> Result<(usize, usize), ApiError> {
    let engine = &state.inner.engine;
    let req = Requirements::new()
        .with(IndexKind::Symbols)
        .with(IndexKind::Locations);
    let view = engine
        .coordinator()
        .acquire_read(req, engine.lock_deadline())?;
    Ok((
        view.locations().map_or(0, |l| l.len()),
        view.symbols().map_or(0, |s| s.symbol_count()),
    ))
}

fn process_rss() -> u64 {
    use sysinfo::{ProcessesToUpdate, System};
    let Ok(pid) = sysinfo::get_current_pid() else {
        return 0;
    };
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system.process(pid).map(|p| p.memory()).unwrap_or(0)
}
