//! HTTP front end.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Liveness, timestamp and version |
//! | `GET`  | `/agents` | Registered agents |
//! | `POST` | `/agents/{agent_id}/generate` | `{prompt, meta?}` → `{text, meta}` |
//! | `POST` | `/agents/{agent_id}/stream` | `{prompt, meta?}` → `text/event-stream` |
//! | `POST` | `/tools/product-search` | `{query, limit?}` → `{snippets}` |
//! | `POST` | `/tools/rag-rephrase` | `{question, snippets, tone?, language?}` → `{answer}` |
//! | `POST` | `/workflows/product-workflow` | `{query, limit?, tone?, language?}` → `{answer, snippets, query}` |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "Prompt is required" } }
//! ```
//!
//! Codes: `bad_request` (400), `not_found` (404), `internal` (500).
//!
//! # Streaming
//!
//! Each SSE frame is `data: <json>\n\n` carrying one delivery event:
//! `{"type":"delta","data":"..."}`, then `{"type":"done"}` or
//! `{"type":"error","data":"..."}`. Validation runs before the response
//! starts, so a bad prompt or unknown agent still gets a 400/404. Errors
//! after that point are sent in-band as an `error` frame.

use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderValue, StatusCode},
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::agents::{AgentInfo, AgentRegistry};
use crate::config::Config;
use crate::delivery::DeliveryEvent;
use crate::error::{classify, RagError};
use crate::models::{RetrievalRequest, SearchResult, SynthesisRequest, WorkflowInput, WorkflowResult};
use crate::services::Services;
use crate::workflow::ProductWorkflow;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub agents: Arc<AgentRegistry>,
    pub workflow: Arc<ProductWorkflow>,
}

impl AppState {
    /// State with the product workflow and the built-in agents.
    pub fn new(workflow: ProductWorkflow) -> Self {
        let workflow = Arc::new(workflow);
        Self {
            agents: Arc::new(AgentRegistry::with_product(Arc::clone(&workflow))),
            workflow,
        }
    }
}

/// Build the router. `cors_origins` empty means any origin.
pub fn build_router(state: AppState, cors_origins: &[String]) -> anyhow::Result<Router> {
    let origin = if cors_origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        let origins = cors_origins
            .iter()
            .map(|o| {
                o.parse::<HeaderValue>()
                    .with_context(|| format!("Invalid CORS origin: {}", o))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        AllowOrigin::list(origins)
    };

    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any);

    Ok(Router::new()
        .route("/health", get(handle_health))
        .route("/agents", get(handle_list_agents))
        .route("/agents/{agent_id}/generate", post(handle_generate))
        .route("/agents/{agent_id}/stream", post(handle_stream))
        .route("/tools/product-search", post(handle_product_search))
        .route("/tools/rag-rephrase", post(handle_rag_rephrase))
        .route("/workflows/product-workflow", post(handle_product_workflow))
        .layer(cors)
        .with_state(state))
}

/// Serve until Ctrl-C.
pub async fn run_server(config: &Config, services: &Services) -> anyhow::Result<()> {
    let state = AppState::new(services.workflow());
    let app = build_router(state, &config.server.cors_origins)?;

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;

    println!("RAG server listening on http://{}", config.server.bind);
    println!("Health check: http://{}/health", config.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await?;

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

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        match err {
            RagError::InvalidInput(msg) => bad_request(msg),
            RagError::UnknownAgent(_) => not_found(err.to_string()),
            other => internal(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        match classify(&err) {
            Some(RagError::InvalidInput(msg)) => bad_request(msg.clone()),
            Some(e @ RagError::UnknownAgent(_)) => not_found(e.to_string()),
            _ => {
                tracing::error!(error = %format!("{:#}", err), "request failed");
                internal(format!("{:#}", err))
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============ GET /agents ============

#[derive(Serialize)]
struct AgentListResponse {
    agents: Vec<AgentInfo>,
}

async fn handle_list_agents(State(state): State<AppState>) -> Json<AgentListResponse> {
    Json(AgentListResponse {
        agents: state.agents.list(),
    })
}

// ============ POST /agents/{agent_id}/... ============

#[derive(Deserialize)]
struct AgentRequest {
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    meta: Option<Value>,
}

impl AgentRequest {
    /// The prompt, or a 400 if it is missing or blank.
    fn prompt(&self) -> Result<&str, AppError> {
        match self.prompt.as_deref() {
            Some(p) if !p.trim().is_empty() => Ok(p),
            _ => Err(bad_request("Prompt is required")),
        }
    }

    fn meta(&self) -> Value {
        self.meta.clone().unwrap_or(Value::Null)
    }
}

#[derive(Serialize)]
struct GenerateResponse {
    text: String,
    meta: Value,
}

async fn handle_generate(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    body: Result<Json<AgentRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>, AppError> {
    let Json(req) = body?;
    let prompt = req.prompt()?;
    let agent = state.agents.get(&agent_id)?;

    let meta = req.meta();
    let text = agent.generate(prompt, &meta).await?;

    Ok(Json(GenerateResponse { text, meta }))
}

async fn handle_stream(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    body: Result<Json<AgentRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let Json(req) = body?;
    let prompt = req.prompt()?;
    let agent = state.agents.get(&agent_id)?;

    let events = agent.stream(prompt, &req.meta()).await?;
    tracing::debug!(agent = %agent_id, "stream started");

    Ok(Sse::new(sse_frames(events)))
}

/// One SSE `data:` frame per delivery event. Ends when the sender closes.
fn sse_frames(
    events: mpsc::Receiver<DeliveryEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(events, |mut events| async move {
        let event = events.recv().await?;
        let frame = match Event::default().json_data(&event) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode delivery event");
                Event::default().data(r#"{"type":"error","data":"failed to encode event"}"#)
            }
        };
        Some((Ok(frame), events))
    })
}

// ============ POST /tools/... ============

async fn handle_product_search(
    State(state): State<AppState>,
    body: Result<Json<RetrievalRequest>, JsonRejection>,
) -> Result<Json<SearchResult>, AppError> {
    let Json(req) = body?;
    let result = state.workflow.retriever().search(&req).await?;
    Ok(Json(result))
}

#[derive(Serialize)]
struct RephraseResponse {
    answer: String,
}

async fn handle_rag_rephrase(
    State(state): State<AppState>,
    body: Result<Json<SynthesisRequest>, JsonRejection>,
) -> Result<Json<RephraseResponse>, AppError> {
    let Json(req) = body?;
    let answer = state.workflow.synthesizer().synthesize(&req).await?;
    Ok(Json(RephraseResponse { answer }))
}

// ============ POST /workflows/product-workflow ============

async fn handle_product_workflow(
    State(state): State<AppState>,
    body: Result<Json<WorkflowInput>, JsonRejection>,
) -> Result<Json<WorkflowResult>, AppError> {
    let Json(input) = body?;
    let result = state.workflow.run(input).await?;
    Ok(Json(result))
}
