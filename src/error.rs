//! Failure taxonomy for the prediction path.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::api::ErrorBody;

/// Everything that can go wrong while serving one prediction request.
///
/// The first six variants are client errors detected during validation,
/// each with a distinct message so callers can tell them apart.
/// `EngineUnavailable` is a persistent process-level condition;
/// `Inference` is per-request and does not imply the engine is broken.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("No image provided")]
    MissingImage,

    #[error("Image too large (max {max_bytes} bytes)")]
    PayloadTooLarge { max_bytes: usize },

    #[error("Invalid image data")]
    InvalidData,

    #[error("Invalid image format")]
    InvalidFormat,

    #[error("Image dimensions too large (max {max}x{max})")]
    DimensionsTooLarge { max: u32 },

    #[error("Unsupported image format")]
    UnsupportedLayout,

    #[error("OCR engine not available: {0}")]
    EngineUnavailable(String),

    #[error("OCR processing failed: {0}")]
    Inference(String),
}

impl PredictError {
    pub fn status(&self) -> StatusCode {
        match self {
            PredictError::EngineUnavailable(_) | PredictError::Inference(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
