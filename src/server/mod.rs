//! HTTP facades for both services.
//!
//! - [`openai_api`]: chat service routes (OpenAI-compatible plus simple text inference)
//! - [`streaming`]: SSE streaming for token-by-token chat responses
//! - [`tts_api`]: speech service routes
//! - [`status`]: load-state fields shared by the health endpoints

pub mod openai_api;
pub mod status;
pub mod streaming;
pub mod tts_api;

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
