use crate::pipeline::PipelineError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;

/// Error body shared by the inference routes. Every failure is a 500; `kind`
/// tells them apart.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub message: String,
    pub kind: &'static str,
}

impl ApiError {
    pub fn decode(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: "decode_error",
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: "internal_error",
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self {
            message: err.to_string(),
            kind: err.kind(),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::internal(format!("Inference task failed: {}", err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!(kind = self.kind, "{}", self.message);
        (StatusCode::INTERNAL_SERVER_ERROR, Json(self)).into_response()
    }
}
