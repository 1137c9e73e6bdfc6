//! omni-serve: HTTP inference services for multimodal chat and TTS models.
//!
//! Each service loads its model once in the background, answers health
//! checks immediately, and serves inference once the model is ready:
//!   chat (OpenAI-compatible, port 8000) / speech (WAV output, port 8002)
//!
//! Also ships a config patcher for multimodal checkpoints and an
//! in-process smoke test.

pub mod audio;
pub mod config;
pub mod device;
pub mod error;
pub mod inference;
pub mod loader;
pub mod patcher;
pub mod server;
pub mod smoke;
