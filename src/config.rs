//! Runtime configuration for omni-serve.
//!
//! Settings come from three layers, later ones winning:
//! built-in defaults, an optional JSON file (`--config`), then CLI flags
//! (each with an environment variable fallback).

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Deserializer, Serialize};

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "omni-serve",
    version,
    about = "HTTP inference services for multimodal chat and text-to-speech models"
)]
pub struct Cli {
    /// Path to a JSON configuration file.
    #[arg(short, long, global = true, env = "OMNI_SERVE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the multimodal chat service.
    Text(TextArgs),

    /// Run the text-to-speech service.
    Tts(TtsArgs),

    /// Add missing sliding-window keys to a model's config.json.
    PatchConfig(PatchArgs),

    /// Load the chat model in-process and run one prompt.
    Smoke(SmokeArgs),
}

/// Listen address flags shared by both services.
#[derive(Args, Debug, Clone, Default)]
pub struct ListenArgs {
    /// Bind host.
    #[arg(long, env = "HOST")]
    pub host: Option<String>,

    /// Bind port.
    #[arg(short, long, env = "PORT")]
    pub port: Option<u16>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct TextArgs {
    /// Checkpoint directory.
    #[arg(long = "model", env = "MODEL_PATH")]
    pub model_path: Option<PathBuf>,

    /// Compute device: auto, cpu, cuda or cuda:N.
    #[arg(long, env = "DEVICE")]
    pub device: Option<String>,

    /// Maximum prompt + completion length in tokens.
    #[arg(long, env = "MAX_MODEL_LEN")]
    pub max_model_len: Option<usize>,

    /// Display name reported by health endpoints.
    #[arg(long, env = "SERVED_MODEL_NAME")]
    pub served_model_name: Option<String>,

    #[command(flatten)]
    pub listen: ListenArgs,
}

#[derive(Args, Debug, Clone, Default)]
pub struct TtsArgs {
    /// Checkpoint directory.
    #[arg(long = "model", env = "MODEL_PATH")]
    pub model_path: Option<PathBuf>,

    /// Compute device: auto, cpu, cuda or cuda:N.
    #[arg(long, env = "DEVICE")]
    pub device: Option<String>,

    /// Cache directory for the model runtime.
    #[arg(long, env = "CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Reference clip for voice cloning.
    #[arg(long, env = "REFERENCE_AUDIO")]
    pub reference_audio: Option<PathBuf>,

    /// Transcript of the reference clip.
    #[arg(long, env = "REFERENCE_TEXT")]
    pub reference_text: Option<String>,

    #[command(flatten)]
    pub listen: ListenArgs,
}

#[derive(Args, Debug, Clone)]
pub struct PatchArgs {
    /// config.json, or a checkpoint directory containing it.
    #[arg(env = "MODEL_PATH", default_value = "/models")]
    pub path: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct SmokeArgs {
    #[command(flatten)]
    pub model: TextArgs,

    /// Prompt to send.
    #[arg(long, default_value = "Describe what you can do.")]
    pub prompt: String,

    /// Maximum new tokens.
    #[arg(long, default_value_t = 100)]
    pub max_tokens: usize,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Chat service settings.
    pub text: TextServiceConfig,

    /// Speech service settings.
    pub tts: TtsServiceConfig,
}

const TEXT_PORT: u16 = 8000;
const TTS_PORT: u16 = 8002;

/// HTTP listen settings.
///
/// Deserialized field by field on top of the owning service's defaults, so
/// a file that only sets `host` keeps that service's port.
#[derive(Debug, Clone, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    fn with_port(port: u16) -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port,
        }
    }

    /// `host:port` for binding.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn apply(&mut self, args: &ListenArgs) {
        if let Some(host) = &args.host {
            self.host = host.clone();
        }
        if let Some(port) = args.port {
            self.port = port;
        }
    }
}

/// `server` section as it appears in a config file, every field optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ServerOverrides {
    host: Option<String>,
    port: Option<u16>,
}

fn server_with_port<'de, D: Deserializer<'de>>(d: D, port: u16) -> Result<ServerConfig, D::Error> {
    let overrides = ServerOverrides::deserialize(d)?;
    let mut server = ServerConfig::with_port(port);
    server.apply(&ListenArgs {
        host: overrides.host,
        port: overrides.port,
    });
    Ok(server)
}

fn text_server<'de, D: Deserializer<'de>>(d: D) -> Result<ServerConfig, D::Error> {
    server_with_port(d, TEXT_PORT)
}

fn tts_server<'de, D: Deserializer<'de>>(d: D) -> Result<ServerConfig, D::Error> {
    server_with_port(d, TTS_PORT)
}

/// Chat service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TextServiceConfig {
    #[serde(deserialize_with = "text_server")]
    pub server: ServerConfig,

    /// Checkpoint directory. Also the model id in `/v1/models`.
    pub model_path: PathBuf,

    /// Device string (auto, cpu, cuda, cuda:N).
    pub device: String,

    /// Maximum prompt + completion length in tokens.
    pub max_model_len: usize,

    /// Display name reported by health endpoints.
    pub model_name: String,
}

impl Default for TextServiceConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::with_port(TEXT_PORT),
            model_path: PathBuf::from("/models"),
            device: "auto".to_string(),
            max_model_len: 4096,
            model_name: "Qwen3-Omni-30B-A3B".to_string(),
        }
    }
}

impl TextServiceConfig {
    /// Identifier advertised by `/v1/models`.
    pub fn model_id(&self) -> String {
        self.model_path.display().to_string()
    }

    pub fn apply(&mut self, args: &TextArgs) {
        if let Some(path) = &args.model_path {
            self.model_path = path.clone();
        }
        if let Some(device) = &args.device {
            self.device = device.clone();
        }
        if let Some(len) = args.max_model_len {
            self.max_model_len = len;
        }
        if let Some(name) = &args.served_model_name {
            self.model_name = name.clone();
        }
        self.server.apply(&args.listen);
    }
}

/// Speech service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsServiceConfig {
    #[serde(deserialize_with = "tts_server")]
    pub server: ServerConfig,

    /// Checkpoint directory.
    pub model_path: PathBuf,

    /// Device string (auto, cpu, cuda, cuda:N).
    pub device: String,

    /// Cache directory for the model runtime.
    pub cache_dir: PathBuf,

    /// Reference clip for voice cloning.
    pub reference_audio: PathBuf,

    /// Transcript of the reference clip.
    pub reference_text: String,

    /// Display name reported by health endpoints.
    pub model_name: String,
}

impl Default for TtsServiceConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::with_port(TTS_PORT),
            model_path: PathBuf::from("/model"),
            device: "cpu".to_string(),
            cache_dir: PathBuf::from("/cache"),
            reference_audio: PathBuf::from("/model/reference.wav"),
            reference_text: "your power is sufficient i said".to_string(),
            model_name: "Qwen3-TTS-0.6B".to_string(),
        }
    }
}

impl TtsServiceConfig {
    pub fn apply(&mut self, args: &TtsArgs) {
        if let Some(path) = &args.model_path {
            self.model_path = path.clone();
        }
        if let Some(device) = &args.device {
            self.device = device.clone();
        }
        if let Some(dir) = &args.cache_dir {
            self.cache_dir = dir.clone();
        }
        if let Some(audio) = &args.reference_audio {
            self.reference_audio = audio.clone();
        }
        if let Some(text) = &args.reference_text {
            self.reference_text = text.clone();
        }
        self.server.apply(&args.listen);
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for
    /// missing fields. No path, or a path that does not exist, yields defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) if path.exists() => {
                let data = std::fs::read_to_string(path)?;
                let config: Config = serde_json::from_str(&data)?;
                Ok(config)
            }
            Some(path) => {
                tracing::warn!("Config file not found at {:?}, using defaults", path);
                Ok(Config::default())
            }
            None => Ok(Config::default()),
        }
    }
}
