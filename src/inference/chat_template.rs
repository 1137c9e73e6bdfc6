//! Conversation types and ChatML prompt rendering.
//!
//! Each turn renders as `<|im_start|>{role}\n{content}<|im_end|>\n` and the
//! prompt ends with `<|im_start|>assistant\n` so the model continues as the
//! assistant. Non-text content parts become modality placeholder tokens.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const IM_START: &str = "<|im_start|>";
pub const IM_END: &str = "<|im_end|>";
pub const END_OF_TEXT: &str = "<|endoftext|>";
pub const VISION_START: &str = "<|vision_start|>";
pub const VISION_END: &str = "<|vision_end|>";
pub const IMAGE_PAD: &str = "<|image_pad|>";
pub const VIDEO_PAD: &str = "<|video_pad|>";
pub const AUDIO_START: &str = "<|audio_start|>";
pub const AUDIO_END: &str = "<|audio_end|>";
pub const AUDIO_PAD: &str = "<|audio_pad|>";

/// All special tokens, in vocabulary order.
pub const SPECIAL_TOKENS: [&str; 10] = [
    IM_START,
    IM_END,
    END_OF_TEXT,
    VISION_START,
    VISION_END,
    IMAGE_PAD,
    VIDEO_PAD,
    AUDIO_START,
    AUDIO_END,
    AUDIO_PAD,
];

/// Message content: plain text or a list of typed parts
/// (`{"type": "text", "text": ...}`, `{"type": "image", ...}`, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<Value>),
}

impl From<&str> for MessageContent {
    fn from(s: &str) -> Self {
        MessageContent::Text(s.to_string())
    }
}

/// One conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatTurn {
    pub role: String,
    pub content: MessageContent,
}

impl ChatTurn {
    pub fn new(role: &str, content: impl Into<MessageContent>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: &str) -> Self {
        Self::new("user", content)
    }
}

impl MessageContent {
    /// Render into prompt text, replacing media parts with placeholders.
    pub fn render(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts.iter().map(render_part).collect(),
        }
    }
}

fn render_part(part: &Value) -> String {
    let kind = part.get("type").and_then(Value::as_str).unwrap_or("text");
    match kind {
        "text" => part
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        "image" | "image_url" => format!("{VISION_START}{IMAGE_PAD}{VISION_END}"),
        "video" => format!("{VISION_START}{VIDEO_PAD}{VISION_END}"),
        "audio" | "input_audio" => format!("{AUDIO_START}{AUDIO_PAD}{AUDIO_END}"),
        _ => String::new(),
    }
}

/// Render a conversation into a single prompt, with the assistant
/// generation header appended.
pub fn render_chatml(conversation: &[ChatTurn]) -> String {
    let mut prompt = String::new();
    for turn in conversation {
        prompt.push_str(IM_START);
        prompt.push_str(&turn.role);
        prompt.push('\n');
        prompt.push_str(&turn.content.render());
        prompt.push_str(IM_END);
        prompt.push('\n');
    }
    prompt.push_str(IM_START);
    prompt.push_str("assistant\n");
    prompt
}
