//! Chat service HTTP API.
//!
//! OpenAI-compatible subset plus a plain text endpoint:
//! - POST /v1/chat/completions (JSON or SSE when `stream` is set)
//! - POST /inference/text
//! - GET /v1/models
//! - GET /health
//! - GET /status
//!
//! Inference routes answer 503 until the background load finishes.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::TextServiceConfig;
use crate::device::select_device;
use crate::error::{ApiError, Result};
use crate::inference::chat_template::ChatTurn;
use crate::inference::engine::{Completion, GenerationEvent, GenerationRequest, TextEngine};
use crate::inference::model::{ChatModel, GenerationParams};
use crate::inference::reference::ReferenceChatModel;
use crate::loader::{spawn_background_load, ModelSlot};
use crate::server::status::LoadStatus;
use crate::server::streaming::generation_to_sse_stream;
use crate::server::unix_now;

/// Fixed creation timestamp advertised by `/v1/models`.
const MODEL_CREATED: u64 = 1_700_000_000;

const DEFAULT_MAX_TOKENS: usize = 512;
const DEFAULT_TEMPERATURE: f64 = 0.7;

/// Application state shared across handlers.
pub struct AppState {
    pub config: Arc<TextServiceConfig>,
    pub slot: Arc<ModelSlot<dyn ChatModel>>,
    pub start_time: Instant,
}

impl AppState {
    /// State with an idle slot. Nothing loads until a loader is started.
    pub fn new(config: TextServiceConfig) -> Self {
        Self {
            config: Arc::new(config),
            slot: Arc::new(ModelSlot::new()),
            start_time: Instant::now(),
        }
    }

    /// Start loading with a custom load function.
    pub fn start_loading<F>(&self, load: F) -> Option<JoinHandle<()>>
    where
        F: FnOnce() -> Result<Arc<dyn ChatModel>> + Send + 'static,
    {
        spawn_background_load("chat", self.slot.clone(), load)
    }

    /// Start loading the checkpoint named in the config.
    pub fn start_default_loader(&self) -> Option<JoinHandle<()>> {
        let config = self.config.clone();
        self.start_loading(move || {
            let device = select_device(&config.device)?;
            let model =
                ReferenceChatModel::from_pretrained(&config.model_path, device, config.max_model_len)?;
            Ok(Arc::new(model) as Arc<dyn ChatModel>)
        })
    }

    /// Device of the loaded model, or the configured device string.
    fn device_label(&self) -> String {
        self.slot
            .ready()
            .map(|model| model.device().to_string())
            .unwrap_or_else(|_| self.config.device.clone())
    }
}

/// Build the axum router with all chat service routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/inference/text", post(text_inference))
        .route("/v1/models", get(list_models))
        .route("/health", get(health))
        .route("/status", get(status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─── Request/Response Types ────────────────────────────────────────────────

/// Chat completion request (OpenAI-compatible).
///
/// Message content may be a string or a list of typed parts
/// (text, image, video, audio).
#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default)]
    pub model: Option<String>,
    pub messages: Vec<ChatTurn>,
    #[serde(default)]
    pub max_tokens: Option<usize>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub stream: Option<bool>,
}

/// Chat completion response (non-streaming).
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    pub usage: Usage,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: usize,
    pub message: AssistantMessage,
    pub finish_reason: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

/// Plain text inference request.
#[derive(Debug, Deserialize)]
pub struct TextRequest {
    pub text: String,
    #[serde(default)]
    pub max_tokens: Option<usize>,
    #[serde(default)]
    pub temperature: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TextResponse {
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// Model listing response.
#[derive(Debug, Serialize)]
pub struct ModelList {
    pub object: String,
    pub data: Vec<ModelInfo>,
}

#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub owned_by: String,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    #[serde(flatten)]
    pub load: LoadStatus,
    pub model: String,
    pub device: String,
    pub uptime_secs: u64,
}

/// Status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub model: String,
    pub state: &'static str,
    pub loaded: bool,
    pub loading: bool,
    pub error: Option<String>,
    pub device: String,
}

fn params(max_tokens: Option<usize>, temperature: Option<f64>) -> GenerationParams {
    GenerationParams::new(
        max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        temperature.unwrap_or(DEFAULT_TEMPERATURE),
    )
}

/// Run a blocking completion off the async runtime, mapping failures to 500.
async fn run_completion(
    engine: TextEngine,
    conversation: Vec<ChatTurn>,
    params: GenerationParams,
    request_id: &str,
) -> std::result::Result<Completion, ApiError> {
    let outcome = tokio::task::spawn_blocking(move || engine.complete(&conversation, &params))
        .await
        .map_err(|e| ApiError::internal(format!("generation task failed: {e}")))?;

    outcome.map_err(|e| {
        error!(request_id, error = ?e, "Inference failed");
        ApiError::internal(e.to_string())
    })
}

// ─── Route Handlers ────────────────────────────────────────────────────────

async fn chat_completions(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<ChatCompletionRequest>, JsonRejection>,
) -> std::result::Result<Response, ApiError> {
    let Json(req) = payload?;
    let model = state.slot.ready()?;
    let request_id = Uuid::new_v4().to_string();
    let model_id = req.model.clone().unwrap_or_else(|| state.config.model_id());
    let stream = req.stream.unwrap_or(false);

    info!(
        request_id = request_id,
        model = model_id,
        messages = req.messages.len(),
        stream,
        "Chat completion request"
    );

    let engine = TextEngine::new(model);
    let params = params(req.max_tokens, req.temperature);

    if stream {
        let mut rx = engine.generate(GenerationRequest {
            request_id: request_id.clone(),
            conversation: req.messages,
            params,
        });

        // Failures before the first token still get a proper status code.
        let first = match rx.recv().await {
            Some(GenerationEvent::Error(e)) => {
                error!(request_id, error = %e, "Inference failed");
                return Err(ApiError::internal(e));
            }
            Some(event) => event,
            None => return Err(ApiError::internal("generation ended without output")),
        };
        let events = tokio_stream::once(first).chain(ReceiverStream::new(rx));
        let stream = generation_to_sse_stream(events, request_id, model_id);
        return Ok(Sse::new(stream).keep_alive(KeepAlive::default()).into_response());
    }

    let completion = run_completion(engine, req.messages, params, &request_id).await?;

    let response = ChatCompletionResponse {
        id: format!("chatcmpl-{request_id}"),
        object: "chat.completion".to_string(),
        created: unix_now(),
        model: model_id,
        choices: vec![ChatChoice {
            index: 0,
            message: AssistantMessage {
                role: "assistant".to_string(),
                content: completion.text,
            },
            finish_reason: "stop".to_string(),
        }],
        usage: Usage {
            prompt_tokens: completion.prompt_tokens,
            completion_tokens: completion.completion_tokens,
            total_tokens: completion.total_tokens,
        },
    };

    Ok(Json(response).into_response())
}

async fn text_inference(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<TextRequest>, JsonRejection>,
) -> std::result::Result<Json<TextResponse>, ApiError> {
    let Json(req) = payload?;
    let model = state.slot.ready()?;
    let request_id = Uuid::new_v4().to_string();

    info!(request_id = request_id, chars = req.text.chars().count(), "Text inference request");

    let conversation = vec![ChatTurn::user(&req.text)];
    let completion = run_completion(
        TextEngine::new(model),
        conversation,
        params(req.max_tokens, req.temperature),
        &request_id,
    )
    .await?;

    Ok(Json(TextResponse {
        text: completion.text,
        input_tokens: completion.prompt_tokens,
        output_tokens: completion.completion_tokens,
    }))
}

async fn list_models(State(state): State<Arc<AppState>>) -> Json<ModelList> {
    Json(ModelList {
        object: "list".to_string(),
        data: vec![ModelInfo {
            id: state.config.model_id(),
            object: "model".to_string(),
            created: MODEL_CREATED,
            owned_by: "qwen".to_string(),
        }],
    })
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        load: LoadStatus::from(&state.slot.state()),
        model: state.config.model_name.clone(),
        device: state.device_label(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let load = LoadStatus::from(&state.slot.state());
    Json(StatusResponse {
        model: state.config.model_name.clone(),
        state: load.state,
        loaded: load.loaded,
        loading: load.loading,
        error: load.error,
        device: state.device_label(),
    })
}
