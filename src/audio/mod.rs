//! Audio helpers for the speech service.
//!
//! - [`wav`]: PCM conversion and WAV container encode/decode
//! - [`fallback`]: synthetic placeholder tone used when no model is available

pub mod fallback;
pub mod wav;
