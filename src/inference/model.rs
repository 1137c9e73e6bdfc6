//! Traits the services program against.
//!
//! Weight formats, tokenization and generation internals belong to the model
//! runtime behind these traits. The HTTP layer only ever sees
//! `Arc<dyn ChatModel>` / `Arc<dyn SpeechModel>`.

use std::path::Path;

use crate::audio::wav::Samples;
use crate::device::Device;
use crate::error::Result;
use crate::inference::chat_template::{render_chatml, ChatTurn};

/// Token ID type.
pub type TokenId = u32;

/// Bounded generation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    /// Maximum number of new tokens.
    pub max_new_tokens: usize,

    /// Sampling temperature.
    pub temperature: f64,

    /// Whether to sample; false means greedy decoding.
    pub do_sample: bool,
}

impl GenerationParams {
    /// Sampling is enabled iff `temperature > 0`.
    pub fn new(max_new_tokens: usize, temperature: f64) -> Self {
        Self {
            max_new_tokens,
            temperature,
            do_sample: temperature > 0.0,
        }
    }
}

/// A conversational text model.
pub trait ChatModel: Send + Sync {
    /// Human-readable model name.
    fn name(&self) -> &str;

    /// Device the weights live on.
    fn device(&self) -> Device;

    /// Render a conversation into a prompt ending with the assistant header.
    fn apply_chat_template(&self, conversation: &[ChatTurn]) -> String {
        render_chatml(conversation)
    }

    /// Tokenize a prompt.
    fn encode(&self, text: &str) -> Result<Vec<TokenId>>;

    /// Run bounded generation.
    ///
    /// Returns the full sequence (prompt followed by new tokens). `on_token`
    /// is called with each new token; returning `false` stops generation.
    fn generate(
        &self,
        input_ids: &[TokenId],
        params: &GenerationParams,
        on_token: &mut dyn FnMut(TokenId) -> bool,
    ) -> Result<Vec<TokenId>>;

    /// Detokenize.
    fn decode(&self, tokens: &[TokenId], skip_special_tokens: bool) -> Result<String>;
}

/// Voice-cloning synthesis input.
#[derive(Debug, Clone, Copy)]
pub struct VoiceCloneRequest<'a> {
    pub text: &'a str,
    pub ref_audio: Option<&'a Path>,
    pub ref_text: Option<&'a str>,
    pub language: &'a str,
}

/// Audio produced by a speech model.
#[derive(Debug, Clone)]
pub struct GeneratedSpeech {
    pub samples: Samples,
    pub sample_rate: u32,
}

/// A text-to-speech model with voice cloning.
pub trait SpeechModel: Send + Sync {
    fn name(&self) -> &str;

    fn device(&self) -> Device;

    fn generate_voice_clone(&self, request: &VoiceCloneRequest<'_>) -> Result<GeneratedSpeech>;
}
