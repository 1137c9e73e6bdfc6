//! Manual load test for the chat model.
//!
//! Loads the checkpoint in-process, runs one prompt through [`TextEngine`]
//! and reports timings. Useful for checking a checkpoint and device before
//! putting the HTTP service in front of it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::info;

use crate::config::TextServiceConfig;
use crate::device::select_device;
use crate::error::Result;
use crate::inference::chat_template::ChatTurn;
use crate::inference::engine::{Completion, TextEngine};
use crate::inference::model::GenerationParams;
use crate::inference::reference::ReferenceChatModel;

/// Outcome of one smoke run.
#[derive(Debug, Clone)]
pub struct SmokeReport {
    pub model: String,
    pub device: String,
    pub completion: Completion,
    pub load_time: Duration,
    pub generation_time: Duration,
}

/// Load the configured chat model and run `prompt` once with greedy decoding.
pub fn run_smoke_test(config: &TextServiceConfig, prompt: &str, max_tokens: usize) -> Result<SmokeReport> {
    let device = select_device(&config.device)?;

    let started = Instant::now();
    let model = ReferenceChatModel::from_pretrained(&config.model_path, device, config.max_model_len)?;
    let load_time = started.elapsed();
    info!(load_secs = load_time.as_secs_f64(), "Model loaded");

    let engine = TextEngine::new(Arc::new(model));
    let started = Instant::now();
    let completion = engine.complete(&[ChatTurn::user(prompt)], &GenerationParams::new(max_tokens, 0.0))?;
    let generation_time = started.elapsed();

    Ok(SmokeReport {
        model: engine.model().name().to_string(),
        device: engine.model().device().to_string(),
        completion,
        load_time,
        generation_time,
    })
}
