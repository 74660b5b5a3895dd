//! HTTP JSON server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/ask` | Answer a question, with optional conversation history |
//! | `POST` | `/calc` | Fluid requirement for a weight in kg |
//! | `POST` | `/classify` | Intent tags and route for a query |
//! | `POST` | `/reload` | Re-read the corpus and swap in a new snapshot |
//! | `GET`  | `/corpus` | Current snapshot statistics |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `reload_failed` (500), `internal` (500).
//! A degraded answer is still a `200`; its `degraded` list says what failed.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use clinical_harness_core::classify::Classification;
use clinical_harness_core::fluids::{calculate, format_requirement, FluidRequirement};
use clinical_harness_core::models::{ConversationTurn, Role};
use clinical_harness_core::store::SnapshotStats;
use clinical_harness_core::suggest::suggest_follow_ups;
use clinical_harness_core::{Answer, Pipeline};

use crate::config::Config;
use crate::engine;

const MAX_QUERY_CHARS: usize = 2000;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(config: Config, pipeline: Pipeline) -> Self {
        Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
        }
    }
}

/// Build the router. Split out from [`run_server`] so tests can drive it.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ask", post(handle_ask))
        .route("/calc", post(handle_calc))
        .route("/classify", post(handle_classify))
        .route("/reload", post(handle_reload))
        .route("/corpus", get(handle_corpus))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind`. Runs until the process is
/// terminated.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let build_config = config.clone();
    let pipeline = tokio::task::spawn_blocking(move || engine::build_pipeline(&build_config))
        .await??;
    let app = router(AppState::new(config, pipeline));

    info!(bind = %bind_addr, "clinical harness server listening");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
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
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
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

impl From<tokio::task::JoinError> for AppError {
    fn from(e: tokio::task::JoinError) -> Self {
        internal(format!("worker task failed: {}", e))
    }
}

fn checked_query(query: &str) -> Result<&str, AppError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    if query.chars().count() > MAX_QUERY_CHARS {
        return Err(bad_request(format!(
            "query must be at most {} characters",
            MAX_QUERY_CHARS
        )));
    }
    Ok(query)
}

// ============ POST /ask ============

#[derive(Debug, Deserialize)]
struct TurnBody {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AskRequest {
    query: String,
    #[serde(default)]
    history: Vec<TurnBody>,
}

#[derive(Serialize)]
struct AskResponse {
    answer: String,
    #[serde(flatten)]
    detail: Answer,
    suggestions: Vec<String>,
}

fn parse_history(turns: Vec<TurnBody>) -> Result<Vec<ConversationTurn>, AppError> {
    turns
        .into_iter()
        .map(|t| {
            let role = match t.role.as_str() {
                "user" | "nurse" => Role::User,
                "assistant" => Role::Assistant,
                other => return Err(bad_request(format!("unknown role: {}", other))),
            };
            Ok(ConversationTurn {
                role,
                content: t.content,
            })
        })
        .collect()
}

async fn handle_ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, AppError> {
    let query = checked_query(&req.query)?.to_string();
    let mut history = parse_history(req.history)?;

    let request_id = uuid::Uuid::new_v4();
    let pipeline = state.pipeline.clone();
    let response = tokio::task::spawn_blocking(move || {
        let detail = pipeline.answer(&query, &history);
        info!(
            request_id = %request_id,
            route = detail.classification.route.as_str(),
            degraded = detail.degraded.len(),
            "POST /ask"
        );
        history.push(ConversationTurn::user(query));
        history.push(ConversationTurn::assistant(detail.text()));
        AskResponse {
            answer: detail.text(),
            suggestions: suggest_follow_ups(&history),
            detail,
        }
    })
    .await?;

    Ok(Json(response))
}

// ============ POST /calc ============

#[derive(Debug, Deserialize)]
struct CalcRequest {
    weight_kg: f64,
}

#[derive(Serialize)]
struct CalcResponse {
    #[serde(flatten)]
    requirement: FluidRequirement,
    bullets: Vec<String>,
}

async fn handle_calc(Json(req): Json<CalcRequest>) -> Result<Json<CalcResponse>, AppError> {
    if !(req.weight_kg.is_finite() && req.weight_kg > 0.0) {
        return Err(bad_request("weight_kg must be a positive number"));
    }
    let requirement = calculate(req.weight_kg);
    Ok(Json(CalcResponse {
        bullets: format_requirement(&requirement),
        requirement,
    }))
}

// ============ POST /classify ============

#[derive(Debug, Deserialize)]
struct ClassifyRequest {
    query: String,
}

async fn handle_classify(
    State(state): State<AppState>,
    Json(req): Json<ClassifyRequest>,
) -> Result<Json<Classification>, AppError> {
    let query = checked_query(&req.query)?;
    Ok(Json(state.pipeline.classify(query)))
}

// ============ POST /reload ============

#[derive(Serialize)]
struct ReloadResponse {
    version: u64,
}

async fn handle_reload(State(state): State<AppState>) -> Result<Json<ReloadResponse>, AppError> {
    let pipeline = state.pipeline.clone();
    let config = state.config.clone();
    let version = tokio::task::spawn_blocking(move || engine::reload(&pipeline, &config))
        .await?
        .map_err(|e| AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "reload_failed",
            message: format!("{:#}", e),
        })?;
    Ok(Json(ReloadResponse { version }))
}

// ============ GET /corpus, GET /health ============

async fn handle_corpus(State(state): State<AppState>) -> Json<SnapshotStats> {
    Json(state.pipeline.knowledge().snapshot().stats())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    snapshot_version: u64,
    checked_at: String,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        snapshot_version: state.pipeline.knowledge().snapshot().version,
        checked_at: chrono::Utc::now().to_rfc3339(),
    })
}
