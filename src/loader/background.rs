//! Once-per-process background model loader.
//!
//! The load closure runs on tokio's blocking pool so request handling keeps
//! going while weights are read. Errors and panics inside the closure end in
//! [`ServiceState::Failed`](super::ServiceState::Failed); nothing is retried.

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::Result;
use crate::loader::state::ModelSlot;

/// Start loading a model into `slot` in the background.
///
/// Returns `None` without doing anything if the slot is already loading or
/// has finished (loaded or failed). Must be called from within a tokio runtime.
pub fn spawn_background_load<M, F>(
    label: &'static str,
    slot: Arc<ModelSlot<M>>,
    load: F,
) -> Option<JoinHandle<()>>
where
    M: ?Sized + Send + Sync + 'static,
    F: FnOnce() -> Result<Arc<M>> + Send + 'static,
{
    if !slot.begin() {
        debug!(model = label, "Load already started, ignoring");
        return None;
    }

    info!(model = label, "Background load started");

    Some(tokio::spawn(async move {
        let started = Instant::now();

        match tokio::task::spawn_blocking(load).await {
            Ok(Ok(model)) => {
                slot.complete(model);
                info!(
                    model = label,
                    elapsed_secs = started.elapsed().as_secs_f64(),
                    "Model loaded"
                );
            }
            Ok(Err(e)) => {
                error!(model = label, error = ?e, "Model load failed");
                slot.fail(e.to_string());
            }
            Err(join_err) => {
                let message = if join_err.is_panic() {
                    format!("loader panicked: {}", panic_message(join_err.into_panic()))
                } else {
                    "loader task cancelled".to_string()
                };
                error!(model = label, error = %message, "Model load failed");
                slot.fail(message);
            }
        }
    }))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
