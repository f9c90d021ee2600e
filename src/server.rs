//! HTTP front ends for both pipelines.
//!
//! # Retrieval-augmented service (`mindful serve rag`)
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/process_audio` | `{"text", "session_id"?}` → `{"response", "exit"}` |
//! | `GET`  | `/get_conversation` | `?session_id=` → `{"conversation": [{"role", "content"}]}`; unknown ids read as empty |
//! | `GET`  | `/` | browser chat page |
//! | `GET`  | `/health` | status and version |
//!
//! # Sentiment service (`mindful serve sentiment`)
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/chat` | `{"message"}` → `{"message", "mood"}` |
//! | `GET`  | `/` | browser chat page |
//! | `GET`  | `/health` | status and version |
//!
//! Errors are `{"error": "<message>"}` with status 400. Backend failures are
//! not errors here: the pipelines answer them with a fallback reply and the
//! request still succeeds.
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::models::{ConversationTurn, Mood};
use crate::pipeline::{RagPipeline, SentimentPipeline};
use crate::session::SessionStore;

const RAG_PAGE: &str = include_str!("../static/rag.html");
const SENTIMENT_PAGE: &str = include_str!("../static/sentiment.html");

#[derive(Clone)]
pub struct RagState {
    pub pipeline: Arc<RagPipeline>,
    pub sessions: Arc<SessionStore>,
}

impl RagState {
    pub fn new(pipeline: RagPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            sessions: Arc::new(SessionStore::new()),
        }
    }
}

#[derive(Clone)]
pub struct SentimentState {
    pub pipeline: Arc<SentimentPipeline>,
}

pub fn rag_router(state: RagState) -> Router {
    Router::new()
        .route("/", get(handle_rag_page))
        .route("/process_audio", post(handle_process_audio))
        .route("/get_conversation", get(handle_get_conversation))
        .route("/health", get(handle_health))
        .layer(cors())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub fn sentiment_router(state: SentimentState) -> Router {
    Router::new()
        .route("/", get(handle_sentiment_page))
        .route("/chat", post(handle_chat))
        .route("/health", get(handle_health))
        .layer(cors())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// `mindful serve rag`
pub async fn run_rag_server(config: &Config) -> anyhow::Result<()> {
    let pipeline = RagPipeline::from_config(config).await?;
    serve(&config.server.bind, rag_router(RagState::new(pipeline)), "rag").await
}

/// `mindful serve sentiment`
pub async fn run_sentiment_server(config: &Config) -> anyhow::Result<()> {
    let pipeline = SentimentPipeline::from_config(&config.sentiment.generation)?;
    let state = SentimentState {
        pipeline: Arc::new(pipeline),
    };
    serve(&config.sentiment.bind, sentiment_router(state), "sentiment").await
}

async fn serve(bind: &str, app: Router, name: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    let addr = listener.local_addr()?;
    info!(service = name, "listening on http://{}", addr);
    println!("{} server listening on http://{}", name, addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

struct AppError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        message: message.into(),
    }
}

/// A body that is missing, not JSON, or of the wrong shape.
fn invalid_body(rejection: JsonRejection) -> AppError {
    bad_request(format!("Invalid request body: {}", rejection.body_text()))
}

// ============ Shared ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Retrieval-augmented service ============

async fn handle_rag_page() -> Html<&'static str> {
    Html(RAG_PAGE)
}

#[derive(Deserialize)]
struct ProcessRequest {
    text: Option<String>,
    session_id: Option<String>,
}

#[derive(Serialize)]
struct ProcessResponse {
    response: String,
    exit: bool,
}

async fn handle_process_audio(
    State(state): State<RagState>,
    payload: Result<Json<ProcessRequest>, JsonRejection>,
) -> Result<Json<ProcessResponse>, AppError> {
    let Json(req) = payload.map_err(invalid_body)?;
    let text = req.text.ok_or_else(|| bad_request("No text provided"))?;

    let session = state.sessions.session(req.session_id.as_deref());
    let _turn = session.begin_turn().await;
    let outcome = state.pipeline.reply(&session.snapshot(), &text).await;
    if !outcome.exit {
        session.record_exchange(&text, &outcome.response);
    }

    Ok(Json(ProcessResponse {
        response: outcome.response,
        exit: outcome.exit,
    }))
}

#[derive(Deserialize)]
struct ConversationQuery {
    session_id: Option<String>,
}

#[derive(Serialize)]
struct ConversationResponse {
    conversation: Vec<ConversationTurn>,
}

async fn handle_get_conversation(
    State(state): State<RagState>,
    Query(query): Query<ConversationQuery>,
) -> Json<ConversationResponse> {
    let conversation = state
        .sessions
        .get(query.session_id.as_deref())
        .map(|session| session.snapshot())
        .unwrap_or_default();
    Json(ConversationResponse { conversation })
}

// ============ Sentiment service ============

async fn handle_sentiment_page() -> Html<&'static str> {
    Html(SENTIMENT_PAGE)
}

#[derive(Deserialize)]
struct ChatRequest {
    message: Option<String>,
}

#[derive(Serialize)]
struct ChatResponse {
    message: String,
    mood: Mood,
}

async fn handle_chat(
    State(state): State<SentimentState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let Json(req) = payload.map_err(invalid_body)?;
    let message = req.message.ok_or_else(|| bad_request("No message provided"))?;

    let reply = state.pipeline.respond(&message).await;
    Ok(Json(ChatResponse {
        message: reply.text,
        mood: reply.mood.unwrap_or(Mood::Neutral),
    }))
}
