//! HTTP endpoints backing the chat widget.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/chat` | Stream an assistant reply as `text/plain` |
//! | `GET`  | `/api/navigation/page-meta` | List navigable pages |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! JSON errors use one shape:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "messages must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `internal` (500), `upstream` (502).
//!
//! The one exception is a missing `OPENAI_API_KEY`: `/api/chat` then answers
//! `500` with the plain-text body `OPENAI_API_KEY is not set` and does not
//! contact the model.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the widget can be
//! served from a different origin than the API.

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::llm::{ChatModel, OpenAiChatModel};
use crate::models::{Message, PageMeta, Role};
use crate::pages::page_meta_for;
use crate::prompt::build_system_prompt;

/// Body of the missing-secret response.
pub const MISSING_KEY_MESSAGE: &str = "OPENAI_API_KEY is not set";

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    /// `None` when no API key is configured.
    model: Option<Arc<dyn ChatModel>>,
}

impl AppState {
    pub fn new(config: Config, model: Option<Arc<dyn ChatModel>>) -> Self {
        Self {
            config: Arc::new(config),
            model,
        }
    }
}

/// Starts the HTTP server using the OpenAI model when `OPENAI_API_KEY` is set.
///
/// Without the key the server still starts; the chat endpoint answers with
/// the missing-secret error and the page list keeps working.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let model: Option<Arc<dyn ChatModel>> = match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.is_empty() => Some(Arc::new(OpenAiChatModel::new(&config.chat, key)?)),
        _ => {
            log::warn!("{}; /api/chat will fail until it is", MISSING_KEY_MESSAGE);
            None
        }
    };
    run_server_with_model(config, model).await
}

/// Starts the HTTP server with an explicit model (or none).
pub async fn run_server_with_model(
    config: &Config,
    model: Option<Arc<dyn ChatModel>>,
) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    if let Some(model) = &model {
        log::info!("chat model: {}", model.model_name());
    }
    let app = router(AppState::new(config.clone(), model));

    log::info!("listening on http://{}", bind_addr);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the router without binding, for embedding and tests.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/chat", post(handle_chat))
        .route("/api/navigation/page-meta", get(handle_page_meta))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
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

fn internal(err: anyhow::Error) -> AppError {
    log::error!("request failed: {:#}", err);
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: format!("{:#}", err),
    }
}

fn upstream(err: anyhow::Error) -> AppError {
    log::error!("model request failed: {:#}", err);
    AppError {
        status: StatusCode::BAD_GATEWAY,
        code: "upstream",
        message: format!("{:#}", err),
    }
}

// ============ GET /health ============

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

// ============ GET /api/navigation/page-meta ============

/// Rebuilt on every request so freshly synced posts show up immediately.
async fn handle_page_meta(State(state): State<AppState>) -> Result<Json<Vec<PageMeta>>, AppError> {
    let pages = page_meta_for(&state.config).map_err(internal)?;
    Ok(Json(pages))
}

// ============ POST /api/chat ============

#[derive(Deserialize)]
struct ChatRequest {
    messages: Vec<Message>,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, AppError> {
    let Some(model) = state.model.clone() else {
        return Ok((StatusCode::INTERNAL_SERVER_ERROR, MISSING_KEY_MESSAGE).into_response());
    };
    if request.messages.is_empty() {
        return Err(bad_request("messages must not be empty"));
    }

    let system = build_system_prompt(&state.config).map_err(internal)?;

    if let Some(last_user) = request.messages.iter().rev().find(|m| m.role == Role::User) {
        log::debug!("last user message: {}", last_user.text());
    }
    log::debug!("system prompt length: {}", system.chars().count());

    let stream = model
        .stream(&system, &request.messages)
        .await
        .map_err(upstream)?;

    let body = Body::from_stream(stream.map(|item| {
        if let Err(e) = &item {
            log::error!("model stream failed: {:#}", e);
        }
        item
    }));

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response())
}
