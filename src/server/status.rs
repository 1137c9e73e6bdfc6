//! Load-state fields reported by health and status endpoints.

use serde::Serialize;

use crate::loader::ServiceState;

/// Flattened into each service's health payload.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LoadStatus {
    /// `loading`, `healthy` or `unhealthy`.
    pub status: &'static str,

    /// `idle`, `loading`, `loaded` or `failed`.
    pub state: &'static str,

    pub loaded: bool,

    pub loading: bool,

    /// Load failure message, if any.
    pub error: Option<String>,
}

impl From<&ServiceState> for LoadStatus {
    fn from(state: &ServiceState) -> Self {
        Self {
            status: state.health_label(),
            state: state.name(),
            loaded: state.is_loaded(),
            loading: state.is_loading(),
            error: state.error().map(str::to_string),
        }
    }
}
