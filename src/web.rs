//! JSON HTTP API over the vocabulary dataset.
//!
//! # Endpoints
//!
//! - `GET /health`: Liveness check.
//! - `GET /api/languages`: Supported target languages.
//! - `GET /api/stats`: Dataset totals.
//! - `GET /api/words?search=&type=&page=&per_page=`: Filtered, paginated words.
//! - `GET /api/word/:word`: Single word lookup.
//! - `GET /api/daily?count=`: Random words for today's review.
//! - `POST /api/download`: Runs the pipeline and stores the result.
//! - `POST /api/create-anki`: Writes a timestamped `.apkg` to the export directory.
//! - `GET /api/download-anki/:filename`: Downloads a previously created package.

use crate::config::Config;
use crate::dataset::{DatasetStore, WordRecord};
use crate::error::VocabError;
use crate::export;
use crate::pipeline::{Pipeline, RunRequest, RunStatus};
use crate::query::{Page, QueryService, Stats, WordQuery, DEFAULT_PER_PAGE};
use crate::retry::ServiceErrorKind;
use crate::translator::{language_name, SOURCE_LANGUAGE, SUPPORTED_LANGUAGES};
use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

/// Default number of words returned by `/api/daily`.
const DEFAULT_DAILY_COUNT: usize = 50;

/// Shared state for all route handlers.
pub struct AppState {
    query: QueryService,
    pipeline: Pipeline,
    export_dir: PathBuf,
    default_language: String,
    /// Held for the duration of a pipeline run; the store has a single writer.
    run_lock: Mutex<()>,
}

impl AppState {
    pub fn new(config: &Config, pipeline: Pipeline) -> Self {
        Self {
            query: QueryService::new(DatasetStore::new(&config.vocab_file)),
            pipeline,
            export_dir: config.export_dir.clone(),
            default_language: config.target_language.clone(),
            run_lock: Mutex::new(()),
        }
    }
}

/// Error body returned by every failing endpoint.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    partial_success: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    translated_count: Option<usize>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn error_response(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            success: false,
            error: message.into(),
            partial_success: None,
            translated_count: None,
        }),
    )
}

/// Maps library errors to HTTP statuses.
///
/// Rate limits become 429 and other degraded-service conditions 503 so
/// clients can tell "retry later" from a bad request.
fn api_error(e: VocabError) -> ApiError {
    let status = match &e {
        VocabError::UnsupportedLanguage(_) | VocabError::TranslationRequired => {
            StatusCode::BAD_REQUEST
        }
        VocabError::NotFound(_) | VocabError::StoreMissing(_) => StatusCode::NOT_FOUND,
        VocabError::Service(s) if s.kind == ServiceErrorKind::RateLimited => {
            StatusCode::TOO_MANY_REQUESTS
        }
        VocabError::SourceNotFound(_) => StatusCode::SERVICE_UNAVAILABLE,
        e if e.is_retry_later() => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("Request failed: {}", e);
    }

    let message = match status {
        StatusCode::TOO_MANY_REQUESTS => {
            "Upstream service rate limit exceeded. Please wait a few minutes and try again."
                .to_string()
        }
        StatusCode::SERVICE_UNAVAILABLE => format!(
            "Service is temporarily unavailable. Please try again in a few minutes. ({})",
            e
        ),
        _ => e.to_string(),
    };
    error_response(status, message)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct LanguagesResponse {
    languages: serde_json::Map<String, serde_json::Value>,
    default: &'static str,
}

#[derive(Debug, Deserialize)]
struct WordsParams {
    search: Option<String>,
    #[serde(rename = "type")]
    word_type: Option<String>,
    page: Option<usize>,
    per_page: Option<usize>,
}

#[derive(Serialize)]
struct WordsResponse {
    #[serde(flatten)]
    page: Page<WordRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DailyParams {
    count: Option<usize>,
}

#[derive(Serialize)]
struct DailyResponse {
    words: Vec<WordRecord>,
    date: String,
    count: usize,
}

#[derive(Debug, Default, Deserialize)]
struct DownloadRequest {
    target_language: Option<String>,
    include_details: Option<bool>,
    max_words: Option<usize>,
    /// Keep an already translated dataset instead of rebuilding it.
    #[serde(default)]
    reuse_existing: bool,
}

#[derive(Serialize)]
struct DownloadResponse {
    success: bool,
    message: String,
    total_words: usize,
    translated_count: usize,
    target_language: String,
}

#[derive(Debug, Default, Deserialize)]
struct CreateAnkiRequest {
    deck_name: Option<String>,
}

#[derive(Serialize)]
struct CreateAnkiResponse {
    success: bool,
    message: String,
    filename: String,
    cards: usize,
}

/// Builds the API router.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/languages", get(languages))
        .route("/api/stats", get(stats))
        .route("/api/words", get(words))
        .route("/api/word/:word", get(word_details))
        .route("/api/daily", get(daily))
        .route("/api/download", post(download))
        .route("/api/create-anki", post(create_anki))
        .route("/api/download-anki/:filename", get(download_anki))
        .layer(cors)
        .with_state(state)
}

/// Serves the API until `shutdown` flips to `true`.
///
/// # Arguments
///
/// * `config` - Listen address, dataset path and export directory.
/// * `pipeline` - Pipeline used by `POST /api/download`.
/// * `shutdown` - Watch receiver that triggers graceful shutdown.
pub async fn run_server(
    config: &Config,
    pipeline: Pipeline,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let state = Arc::new(AppState::new(config, pipeline));
    let app = router(state);

    let addr = SocketAddr::from((config.host, config.port));
    info!("Vocabulary API listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while shutdown.changed().await.is_ok() {
                if *shutdown.borrow() {
                    break;
                }
            }
        })
        .await
        .context("Server error")?;

    info!("Vocabulary API stopped");
    Ok(())
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

async fn languages() -> Json<LanguagesResponse> {
    let languages = SUPPORTED_LANGUAGES
        .iter()
        .map(|(code, name)| (code.to_string(), serde_json::Value::from(*name)))
        .collect();
    Json(LanguagesResponse {
        languages,
        default: SOURCE_LANGUAGE,
    })
}

async fn stats(State(state): State<Arc<AppState>>) -> ApiResult<Stats> {
    state.query.stats().map(Json).map_err(api_error)
}

/// Lists words. A missing dataset is not an error here: the response is an
/// empty page with a hint to run the pipeline.
async fn words(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WordsParams>,
) -> ApiResult<WordsResponse> {
    let query = WordQuery {
        search: params.search,
        word_type: params.word_type,
        page: params.page.unwrap_or(1),
        per_page: params.per_page.unwrap_or(DEFAULT_PER_PAGE),
    };

    match state.query.words(&query) {
        Ok(page) => Ok(Json(WordsResponse { page, error: None })),
        Err(e) if e.is_store_missing() => Ok(Json(WordsResponse {
            page: Page {
                words: Vec::new(),
                total: 0,
                page: query.page,
                per_page: query.per_page,
                total_pages: 0,
            },
            error: Some(
                "Vocabulary file not found. Run the pipeline to build the dataset.".to_string(),
            ),
        })),
        Err(e) => Err(api_error(e)),
    }
}

async fn word_details(
    State(state): State<Arc<AppState>>,
    Path(word): Path<String>,
) -> ApiResult<WordRecord> {
    state.query.word(&word).map(Json).map_err(api_error)
}

async fn daily(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DailyParams>,
) -> ApiResult<DailyResponse> {
    let words = state
        .query
        .daily(params.count.unwrap_or(DEFAULT_DAILY_COUNT))
        .map_err(api_error)?;

    Ok(Json(DailyResponse {
        count: words.len(),
        words,
        date: chrono::Local::now().format("%Y-%m-%d").to_string(),
    }))
}

/// Runs the pipeline.
///
/// Completed and skipped runs return 200. An interrupted run that translated
/// something is saved and reported with 206.
async fn download(
    State(state): State<Arc<AppState>>,
    body: Option<Json<DownloadRequest>>,
) -> Result<Json<DownloadResponse>, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let target = body
        .target_language
        .unwrap_or_else(|| state.default_language.clone())
        .trim()
        .to_lowercase();

    let Ok(_guard) = state.run_lock.try_lock() else {
        return Err(error_response(
            StatusCode::CONFLICT,
            "A pipeline run is already in progress",
        ));
    };

    let store = state.query.store();
    let existing = if body.reuse_existing && store.exists() {
        Some(store.load().map_err(api_error)?)
    } else {
        None
    };

    let request = RunRequest {
        target_language: target.clone(),
        include_details: body.include_details.unwrap_or(true),
        max_words: body.max_words,
        existing,
    };
    let report = state
        .pipeline
        .run_and_store(store, request)
        .await
        .map_err(api_error)?;

    match report.status {
        RunStatus::Completed | RunStatus::Skipped => Ok(Json(DownloadResponse {
            success: true,
            message: format!(
                "{} words downloaded. {} words translated to {}",
                report.dataset.len(),
                report.translated,
                language_name(&target).unwrap_or(&target)
            ),
            total_words: report.dataset.len(),
            translated_count: report.translated,
            target_language: target,
        })),
        RunStatus::Partial if report.saved => Err((
            StatusCode::PARTIAL_CONTENT,
            Json(ErrorResponse {
                success: false,
                error: format!(
                    "Translation partially completed. {} words translated.",
                    report.translated
                ),
                partial_success: Some(true),
                translated_count: Some(report.translated),
            }),
        )),
        RunStatus::Partial => {
            warn!("Pipeline interrupted before any word was translated");
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Translation interrupted before any word was translated",
            ))
        }
    }
}

async fn create_anki(
    State(state): State<Arc<AppState>>,
    body: Option<Json<CreateAnkiRequest>>,
) -> ApiResult<CreateAnkiResponse> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let deck_name = body
        .deck_name
        .unwrap_or_else(|| export::DEFAULT_DECK_NAME.to_string());

    let store = state.query.store().clone();
    if !store.exists() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Please download the dataset first",
        ));
    }

    let filename = export::deck_file_name(chrono::Local::now());
    let output = state.export_dir.join(&filename);

    let cards = tokio::task::spawn_blocking(move || {
        let dataset = store.load()?;
        export::export_deck(&dataset, &deck_name, &output)
    })
    .await
    .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
    .map_err(api_error)?;

    Ok(Json(CreateAnkiResponse {
        success: true,
        message: "Anki deck created successfully".to_string(),
        filename,
        cards,
    }))
}

async fn download_anki(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    let path = export::resolve_package(&state.export_dir, &filename)
        .map_err(|_| error_response(StatusCode::NOT_FOUND, "File not found"))?;

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| api_error(VocabError::Io(e)))?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        bytes,
    )
        .into_response())
}
