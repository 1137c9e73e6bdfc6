//! Background model loading and the process-wide load state.
//!
//! - [`state`]: [`ServiceState`] and the [`ModelSlot`] that publishes a loaded model
//! - [`background`]: the once-per-process loader task

pub mod background;
pub mod state;

pub use background::spawn_background_load;
pub use state::{ModelSlot, NotReady, ServiceState};
