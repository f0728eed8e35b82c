use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::detection::DetectError;

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    ImageTooLarge(String),
    Internal(String),
    Detection(DetectError),
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest(msg) => write!(f, "{msg}"),
            Self::ImageTooLarge(msg) => write!(f, "{msg}"),
            Self::Internal(msg) => write!(f, "Internal error: {msg}"),
            Self::Detection(e) => write!(f, "Detection error: {e}"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            Self::ImageTooLarge(_) => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            Self::Internal(_) | Self::Detection(_) => {
                tracing::error!("{self}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        if status.is_client_error() {
            tracing::warn!(status = status.as_u16(), "{message}");
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<DetectError> for AppError {
    fn from(e: DetectError) -> Self {
        match e {
            DetectError::ImageError(_) | DetectError::InvalidImage(_) => {
                Self::BadRequest(e.to_string())
            }
            DetectError::ImageTooLarge { .. } => Self::ImageTooLarge(e.to_string()),
            other => Self::Detection(other),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(e: JsonRejection) -> Self {
        Self::BadRequest(e.body_text())
    }
}
