//! Load state shared between the loader task and request handlers.
//!
//! The phase is a single atomic byte written by one task and read by many.
//! The failure message and the model handle live in write-once cells that
//! are filled *before* the phase is published, so a reader that observes
//! `Loaded` or `Failed` always sees the matching payload.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use thiserror::Error;

const IDLE: u8 = 0;
const LOADING: u8 = 1;
const LOADED: u8 = 2;
const FAILED: u8 = 3;

/// Snapshot of a service's model load status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceState {
    /// The loader has not been started.
    Idle,
    /// The loader task is running.
    Loading,
    /// The model is available for inference.
    Loaded,
    /// Loading failed; the message is kept for health reporting.
    Failed(String),
}

impl ServiceState {
    /// Lowercase state name used in health payloads.
    pub fn name(&self) -> &'static str {
        match self {
            ServiceState::Idle => "idle",
            ServiceState::Loading => "loading",
            ServiceState::Loaded => "loaded",
            ServiceState::Failed(_) => "failed",
        }
    }

    /// Coarse health label: `loading`, `healthy` or `unhealthy`.
    pub fn health_label(&self) -> &'static str {
        match self {
            ServiceState::Loading => "loading",
            ServiceState::Loaded => "healthy",
            ServiceState::Idle | ServiceState::Failed(_) => "unhealthy",
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, ServiceState::Loaded)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, ServiceState::Loading)
    }

    /// The stored failure message, if loading failed.
    pub fn error(&self) -> Option<&str> {
        match self {
            ServiceState::Failed(msg) => Some(msg),
            _ => None,
        }
    }
}

/// Why a request could not be served by the model.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotReady {
    #[error("Model loading has not started")]
    Idle,

    #[error("Model is still loading, please wait...")]
    Loading,

    #[error("Model failed to load: {0}")]
    Failed(String),
}

/// Holds the load phase and, once loaded, the model itself.
pub struct ModelSlot<M: ?Sized> {
    phase: AtomicU8,
    error: OnceLock<String>,
    model: OnceLock<Arc<M>>,
}

impl<M: ?Sized> ModelSlot<M> {
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(IDLE),
            error: OnceLock::new(),
            model: OnceLock::new(),
        }
    }

    /// Read the current state.
    pub fn state(&self) -> ServiceState {
        match self.phase.load(Ordering::Acquire) {
            LOADING => ServiceState::Loading,
            LOADED => ServiceState::Loaded,
            FAILED => ServiceState::Failed(self.error.get().cloned().unwrap_or_default()),
            _ => ServiceState::Idle,
        }
    }

    /// The loaded model, or the reason it is unavailable.
    pub fn ready(&self) -> Result<Arc<M>, NotReady> {
        match self.state() {
            ServiceState::Loaded => self
                .model
                .get()
                .cloned()
                .ok_or_else(|| NotReady::Failed("model handle missing".to_string())),
            ServiceState::Loading => Err(NotReady::Loading),
            ServiceState::Failed(msg) => Err(NotReady::Failed(msg)),
            ServiceState::Idle => Err(NotReady::Idle),
        }
    }

    /// Move `Idle -> Loading`. Returns false if a load already started.
    pub(crate) fn begin(&self) -> bool {
        self.phase
            .compare_exchange(IDLE, LOADING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Publish the loaded model. No-op unless the slot is `Loading`.
    pub(crate) fn complete(&self, model: Arc<M>) {
        if self.phase.load(Ordering::Acquire) != LOADING {
            return;
        }
        let _ = self.model.set(model);
        self.phase.store(LOADED, Ordering::Release);
    }

    /// Record a load failure. No-op unless the slot is `Loading`.
    pub(crate) fn fail(&self, message: String) {
        if self.phase.load(Ordering::Acquire) != LOADING {
            return;
        }
        let _ = self.error.set(message);
        self.phase.store(FAILED, Ordering::Release);
    }
}

impl<M: ?Sized> Default for ModelSlot<M> {
    fn default() -> Self {
        Self::new()
    }
}
