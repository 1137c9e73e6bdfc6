//! Speech service HTTP API.
//!
//! - GET /health
//! - GET /
//! - POST /v1/tts: JSON with base64 WAV. Uses the fallback tone when no
//!   model is available, 503 while the model is still loading.
//! - POST /v1/audio/speech: OpenAI-style, raw WAV body, always needs the model.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::TtsServiceConfig;
use crate::device::select_device;
use crate::error::{ApiError, Result};
use crate::inference::model::SpeechModel;
use crate::inference::reference::ReferenceSpeechModel;
use crate::inference::speech::{
    round2, synthesize_fallback, synthesize_with_model, ReferenceVoice, SynthesizedAudio,
};
use crate::loader::{spawn_background_load, ModelSlot, NotReady};
use crate::server::status::LoadStatus;

/// Longest accepted input, in characters.
pub const MAX_TEXT_CHARS: usize = 5000;

const FALLBACK_NOTE: &str = "Fallback mode - sine wave audio";

/// Application state shared across handlers.
pub struct AppState {
    pub config: Arc<TtsServiceConfig>,
    pub slot: Arc<ModelSlot<dyn SpeechModel>>,
    pub reference: ReferenceVoice,
    pub start_time: Instant,
}

impl AppState {
    /// State with an idle slot. Nothing loads until a loader is started.
    pub fn new(config: TtsServiceConfig) -> Self {
        let reference = ReferenceVoice {
            audio: config.reference_audio.clone(),
            text: config.reference_text.clone(),
        };
        Self {
            config: Arc::new(config),
            slot: Arc::new(ModelSlot::new()),
            reference,
            start_time: Instant::now(),
        }
    }

    /// Start loading with a custom load function.
    pub fn start_loading<F>(&self, load: F) -> Option<JoinHandle<()>>
    where
        F: FnOnce() -> Result<Arc<dyn SpeechModel>> + Send + 'static,
    {
        spawn_background_load("tts", self.slot.clone(), load)
    }

    /// Start loading the checkpoint named in the config.
    pub fn start_default_loader(&self) -> Option<JoinHandle<()>> {
        let config = self.config.clone();
        self.start_loading(move || {
            if let Err(e) = std::fs::create_dir_all(&config.cache_dir) {
                warn!(path = %config.cache_dir.display(), error = %e, "Cannot create cache directory");
            }
            let device = select_device(&config.device)?;
            let model = ReferenceSpeechModel::from_pretrained(&config.model_path, device)?;
            Ok(Arc::new(model) as Arc<dyn SpeechModel>)
        })
    }

    fn device_label(&self) -> String {
        self.slot
            .ready()
            .map(|model| model.device().to_string())
            .unwrap_or_else(|_| self.config.device.clone())
    }
}

/// Build the axum router with all speech service routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/", get(root))
        .route("/v1/tts", post(text_to_speech))
        .route("/v1/audio/speech", post(openai_speech))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─── Request/Response Types ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TtsRequest {
    pub text: String,
    #[serde(default = "default_voice")]
    pub voice: String,
    #[serde(default = "default_speed")]
    pub speed: f64,
    #[serde(default = "default_format")]
    pub response_format: String,
}

/// OpenAI `audio/speech` request.
#[derive(Debug, Deserialize)]
pub struct SpeechRequest {
    #[serde(default = "default_speech_model")]
    pub model: String,
    pub input: String,
    #[serde(default = "default_openai_voice")]
    pub voice: String,
    #[serde(default = "default_format")]
    pub response_format: String,
    #[serde(default = "default_speed")]
    pub speed: f64,
}

fn default_voice() -> String {
    "default".to_string()
}
fn default_openai_voice() -> String {
    "alloy".to_string()
}
fn default_speech_model() -> String {
    "qwen3-tts".to_string()
}
fn default_format() -> String {
    "wav".to_string()
}
fn default_speed() -> f64 {
    1.0
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TtsResponse {
    pub text: String,
    pub audio_base64: String,
    pub sample_rate: u32,
    pub format: String,
    pub duration_seconds: f64,
    pub real_model: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    #[serde(flatten)]
    pub load: LoadStatus,
    pub model: String,
    pub device: String,
    pub real_model: bool,
    pub fallback_mode: bool,
    pub uptime_secs: u64,
}

// ─── Validation ────────────────────────────────────────────────────────────

fn validate_text(field: &str, text: &str) -> std::result::Result<(), ApiError> {
    let chars = text.chars().count();
    if chars == 0 || chars > MAX_TEXT_CHARS {
        return Err(ApiError::unprocessable(format!(
            "{field} must be between 1 and {MAX_TEXT_CHARS} characters, got {chars}"
        )));
    }
    Ok(())
}

fn validate_speed(speed: f64, min: f64, max: f64) -> std::result::Result<(), ApiError> {
    if !(min..=max).contains(&speed) {
        return Err(ApiError::unprocessable(format!(
            "speed must be between {min} and {max}, got {speed}"
        )));
    }
    Ok(())
}

fn validate_format(format: &str) -> std::result::Result<(), ApiError> {
    if format != "wav" {
        return Err(ApiError::unprocessable(format!(
            "unsupported response_format '{format}', only 'wav' is available"
        )));
    }
    Ok(())
}

impl TtsRequest {
    pub fn validate(&self) -> std::result::Result<(), ApiError> {
        validate_text("text", &self.text)?;
        validate_speed(self.speed, 0.5, 2.0)?;
        validate_format(&self.response_format)
    }
}

impl SpeechRequest {
    pub fn validate(&self) -> std::result::Result<(), ApiError> {
        validate_text("input", &self.input)?;
        validate_speed(self.speed, 0.25, 4.0)?;
        validate_format(&self.response_format)
    }
}

// ─── Route Handlers ────────────────────────────────────────────────────────

/// Run a blocking synthesis job, mapping failures to 500.
async fn run_synthesis<F>(job: F) -> std::result::Result<SynthesizedAudio, ApiError>
where
    F: FnOnce() -> Result<SynthesizedAudio> + Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| ApiError::internal(format!("synthesis task failed: {e}")))?
        .map_err(|e| {
            error!(error = ?e, "TTS error");
            ApiError::internal(format!("TTS error: {e}"))
        })
}

async fn text_to_speech(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<TtsRequest>, JsonRejection>,
) -> std::result::Result<Json<TtsResponse>, ApiError> {
    let Json(req) = payload?;
    req.validate()?;
    debug!(voice = req.voice, speed = req.speed, "TTS request");

    let text = req.text.clone();
    let audio = match state.slot.ready() {
        Ok(model) => {
            let reference = state.reference.clone();
            run_synthesis(move || synthesize_with_model(model.as_ref(), &text, &reference)).await?
        }
        Err(NotReady::Loading) => return Err(NotReady::Loading.into()),
        Err(_) => {
            let speed = req.speed;
            run_synthesis(move || synthesize_fallback(&text, speed)).await?
        }
    };

    info!(
        real_model = audio.real_model,
        duration_secs = audio.duration_secs,
        "Synthesized speech"
    );

    Ok(Json(TtsResponse {
        text: req.text,
        audio_base64: BASE64.encode(&audio.wav),
        sample_rate: audio.sample_rate,
        format: "wav".to_string(),
        duration_seconds: round2(audio.duration_secs),
        real_model: audio.real_model,
        note: (!audio.real_model).then(|| FALLBACK_NOTE.to_string()),
    }))
}

async fn openai_speech(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<SpeechRequest>, JsonRejection>,
) -> std::result::Result<Response, ApiError> {
    let Json(req) = payload?;
    req.validate()?;
    let model = state.slot.ready()?;
    debug!(model = req.model, voice = req.voice, "Speech request");

    let reference = state.reference.clone();
    let input = req.input;
    let audio =
        run_synthesis(move || synthesize_with_model(model.as_ref(), &input, &reference)).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "audio/wav"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"speech.wav\""),
        ],
        audio.wav,
    )
        .into_response())
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let load = LoadStatus::from(&state.slot.state());
    let fallback_mode = !load.loaded && !load.loading;
    Json(HealthResponse {
        real_model: load.loaded,
        fallback_mode,
        load,
        model: state.config.model_name.clone(),
        device: state.device_label(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

async fn root(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "service": state.config.model_name,
        "version": env!("CARGO_PKG_VERSION"),
        "model_loaded": state.slot.state().is_loaded(),
        "device": state.device_label(),
        "endpoints": {
            "health": "GET /health",
            "tts": "POST /v1/tts",
            "openai_speech": "POST /v1/audio/speech",
        },
    }))
}
