//! Model abstraction and inference adapters.
//!
//! - [`model`]: the [`ChatModel`](model::ChatModel) / [`SpeechModel`](model::SpeechModel) seams
//! - [`chat_template`]: conversation types and ChatML prompt rendering
//! - [`model_loader`]: checkpoint directory inspection
//! - [`reference`]: built-in reference backends for both model kinds
//! - [`engine`]: text adapter (templating, bounded generation, suffix decoding)
//! - [`speech`]: speech adapter (voice cloning or fallback tone, WAV output)

pub mod chat_template;
pub mod engine;
pub mod model;
pub mod model_loader;
pub mod reference;
pub mod speech;
