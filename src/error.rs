//! Error types shared by the loaders, adapters and HTTP handlers.
//!
//! - [`ServeError`]: library-level failures
//! - [`ApiError`]: HTTP status + message, rendered as an OpenAI error envelope

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::loader::NotReady;

#[derive(Error, Debug)]
pub enum ServeError {
    #[error("Model files not found at {0}")]
    ModelFilesNotFound(String),

    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Audio encoding error: {0}")]
    Audio(#[from] hound::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ServeError>;

/// An error returned from an HTTP handler.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn unprocessable(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message: msg.into(),
        }
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.message,
                "type": match self.status {
                    StatusCode::UNPROCESSABLE_ENTITY => "invalid_request_error",
                    StatusCode::SERVICE_UNAVAILABLE => "service_unavailable",
                    _ => "server_error",
                },
                "param": null,
                "code": self.status.as_str()
            }
        }));
        (self.status, body).into_response()
    }
}

impl From<ServeError> for ApiError {
    fn from(err: ServeError) -> Self {
        match &err {
            ServeError::InvalidRequest(_) => ApiError::unprocessable(err.to_string()),
            _ => ApiError::internal(err.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::unprocessable(rejection.body_text())
    }
}

impl From<NotReady> for ApiError {
    fn from(err: NotReady) -> Self {
        ApiError::unavailable(err.to_string())
    }
}
