//! Built-in reference backends.
//!
//! These stand in for the model runtime: they validate a checkpoint
//! directory the same way a real loader would and then produce deterministic
//! output, so the services, adapters and tests run end to end without
//! gigabytes of weights or an accelerator.
//!
//! - [`ByteTokenizer`]: UTF-8 bytes plus the ChatML special tokens
//! - [`ReferenceChatModel`]: replies by repeating the final user turn
//! - [`ReferenceSpeechModel`]: replies with the reference clip, looped to length

use std::path::Path;

use serde_json::Value;
use tracing::{debug, info};

use crate::audio::fallback::estimate_duration;
use crate::audio::wav::{read_wav_mono, Samples};
use crate::device::Device;
use crate::error::{Result, ServeError};
use crate::inference::chat_template::{IM_END, IM_START, SPECIAL_TOKENS};
use crate::inference::model::{
    ChatModel, GeneratedSpeech, GenerationParams, SpeechModel, TokenId, VoiceCloneRequest,
};
use crate::inference::model_loader::{find_weight_files, inspect_checkpoint, read_config};

/// Output sample rate when no reference clip is available.
pub const DEFAULT_SPEECH_SAMPLE_RATE: u32 = 24_000;

// ─── Tokenizer ─────────────────────────────────────────────────────────────

/// Byte-level tokenizer: ids 0-255 are raw bytes, special tokens follow.
#[derive(Debug, Clone, Default)]
pub struct ByteTokenizer;

impl ByteTokenizer {
    const SPECIAL_BASE: TokenId = 256;

    pub fn special_id(token: &str) -> Option<TokenId> {
        SPECIAL_TOKENS
            .iter()
            .position(|t| *t == token)
            .map(|i| Self::SPECIAL_BASE + i as TokenId)
    }

    pub fn encode(&self, text: &str) -> Vec<TokenId> {
        let mut ids = Vec::with_capacity(text.len());
        let mut rest = text;
        'outer: while !rest.is_empty() {
            if rest.starts_with("<|") {
                for (i, token) in SPECIAL_TOKENS.iter().enumerate() {
                    if let Some(tail) = rest.strip_prefix(token) {
                        ids.push(Self::SPECIAL_BASE + i as TokenId);
                        rest = tail;
                        continue 'outer;
                    }
                }
            }
            // Consume one character's worth of bytes.
            let ch_len = rest.chars().next().map(char::len_utf8).unwrap_or(1);
            ids.extend(rest.as_bytes()[..ch_len].iter().map(|&b| b as TokenId));
            rest = &rest[ch_len..];
        }
        ids
    }

    pub fn decode(&self, tokens: &[TokenId], skip_special_tokens: bool) -> Result<String> {
        let mut bytes = Vec::with_capacity(tokens.len());
        for &id in tokens {
            if id < Self::SPECIAL_BASE {
                bytes.push(id as u8);
                continue;
            }
            let token = SPECIAL_TOKENS
                .get((id - Self::SPECIAL_BASE) as usize)
                .ok_or_else(|| ServeError::Inference(format!("token id {id} out of vocabulary")))?;
            if !skip_special_tokens {
                bytes.extend_from_slice(token.as_bytes());
            }
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

// ─── Chat model ────────────────────────────────────────────────────────────

/// Reference multimodal chat model.
pub struct ReferenceChatModel {
    name: String,
    device: Device,
    max_model_len: usize,
    tokenizer: ByteTokenizer,
}

impl ReferenceChatModel {
    /// Validate and "load" a checkpoint directory.
    ///
    /// Rejects a multimodal config whose talker code-predictor section lacks
    /// `use_sliding_window`, which the real runtime also fails on.
    pub fn from_pretrained(dir: &Path, device: Device, max_model_len: usize) -> Result<Self> {
        info!(path = %dir.display(), device = %device, "Loading chat model");

        let checkpoint = inspect_checkpoint(dir)?;
        let config = read_config(dir)?;
        check_code_predictor_config(&config)?;

        let name = checkpoint
            .architecture
            .clone()
            .or(checkpoint.model_type.clone())
            .unwrap_or_else(|| "unknown".to_string());

        info!(
            model = %name,
            device = %device,
            max_model_len,
            "Chat model ready"
        );

        Ok(Self {
            name,
            device,
            max_model_len,
            tokenizer: ByteTokenizer,
        })
    }

    /// The final user turn's tokens, excluding its delimiters.
    fn last_user_turn<'a>(&self, input_ids: &'a [TokenId]) -> &'a [TokenId] {
        let (Some(start), Some(end)) = (
            ByteTokenizer::special_id(IM_START),
            ByteTokenizer::special_id(IM_END),
        ) else {
            return &[];
        };
        let header: Vec<TokenId> = "user\n".bytes().map(TokenId::from).collect();

        let Some(open) = input_ids
            .windows(header.len() + 1)
            .rposition(|w| w[0] == start && w[1..] == header[..])
        else {
            return &[];
        };
        let body = &input_ids[open + 1 + header.len()..];
        let close = body.iter().position(|&t| t == end).unwrap_or(body.len());
        &body[..close]
    }
}

fn check_code_predictor_config(config: &Value) -> Result<()> {
    let Some(predictor) = config
        .get("talker_config")
        .and_then(|t| t.get("code_predictor_config"))
    else {
        return Ok(());
    };
    if predictor.get("use_sliding_window").is_none() {
        return Err(ServeError::ModelLoad(
            "code_predictor_config has no attribute 'use_sliding_window'; \
             run `omni-serve patch-config` on this checkpoint"
                .to_string(),
        ));
    }
    Ok(())
}

impl ChatModel for ReferenceChatModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn device(&self) -> Device {
        self.device
    }

    fn encode(&self, text: &str) -> Result<Vec<TokenId>> {
        Ok(self.tokenizer.encode(text))
    }

    fn generate(
        &self,
        input_ids: &[TokenId],
        params: &GenerationParams,
        on_token: &mut dyn FnMut(TokenId) -> bool,
    ) -> Result<Vec<TokenId>> {
        if input_ids.len() >= self.max_model_len {
            return Err(ServeError::Inference(format!(
                "prompt of {} tokens exceeds max model length {}",
                input_ids.len(),
                self.max_model_len
            )));
        }
        let budget = params
            .max_new_tokens
            .min(self.max_model_len - input_ids.len());

        debug!(
            prompt_tokens = input_ids.len(),
            budget,
            temperature = params.temperature,
            do_sample = params.do_sample,
            "Generating"
        );

        let reply = self.last_user_turn(input_ids);
        let eos = ByteTokenizer::special_id(IM_END);

        let mut output = input_ids.to_vec();
        for &token in reply.iter().chain(eos.iter()) {
            if output.len() - input_ids.len() >= budget {
                break;
            }
            output.push(token);
            if !on_token(token) {
                break;
            }
        }
        Ok(output)
    }

    fn decode(&self, tokens: &[TokenId], skip_special_tokens: bool) -> Result<String> {
        self.tokenizer.decode(tokens, skip_special_tokens)
    }
}

// ─── Speech model ──────────────────────────────────────────────────────────

/// Reference voice-cloning speech model.
pub struct ReferenceSpeechModel {
    name: String,
    device: Device,
}

impl ReferenceSpeechModel {
    /// Require at least one weight file in `dir`.
    pub fn from_pretrained(dir: &Path, device: Device) -> Result<Self> {
        info!(path = %dir.display(), device = %device, "Loading speech model");

        let weights = find_weight_files(dir)?;
        if weights.is_empty() {
            return Err(ServeError::ModelFilesNotFound(dir.display().to_string()));
        }

        let name = read_config(dir)
            .ok()
            .and_then(|c| c.get("model_type").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| "qwen3-tts".to_string());

        info!(model = %name, files = weights.len(), "Speech model ready");
        Ok(Self { name, device })
    }
}

impl SpeechModel for ReferenceSpeechModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn device(&self) -> Device {
        self.device
    }

    fn generate_voice_clone(&self, request: &VoiceCloneRequest<'_>) -> Result<GeneratedSpeech> {
        let duration = estimate_duration(request.text, 1.0);

        let (clip, sample_rate) = match request.ref_audio {
            Some(path) => read_wav_mono(path)?,
            None => (Vec::new(), DEFAULT_SPEECH_SAMPLE_RATE),
        };
        let n = (duration * sample_rate as f64) as usize;

        let samples = if clip.is_empty() {
            vec![0.0; n]
        } else {
            clip.iter().copied().cycle().take(n).collect()
        };

        debug!(
            chars = request.text.chars().count(),
            language = request.language,
            cloned = request.ref_audio.is_some(),
            ref_text = request.ref_text.unwrap_or_default(),
            samples = samples.len(),
            "Synthesized speech"
        );

        Ok(GeneratedSpeech {
            samples: Samples::Float(samples),
            sample_rate,
        })
    }
}
