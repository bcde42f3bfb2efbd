//! Wire types shared by the HTTP server and the client subcommands.

use serde::{Deserialize, Serialize};

/// JSON request body accepted by `POST /invocations`.
#[derive(Debug, Serialize)]
pub struct PredictRequest {
    /// Base64-encoded image bytes.
    pub image: String,
}

/// A single recognized text region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    /// Bounding polygon, ordered points in input-image coordinates.
    pub bbox: Vec<[f32; 2]>,
    /// Recognized text; empty when recognition produced nothing for the region.
    pub text: String,
    /// Recognition confidence in [0, 1].
    pub confidence: f32,
}

/// Successful response from `POST /invocations`.
#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub detections: Vec<Detection>,
    pub count: usize,
    pub status: String,
    pub gpu_enabled: bool,
}

impl PredictResponse {
    pub fn new(detections: Vec<Detection>, gpu_enabled: bool) -> Self {
        let count = detections.len();
        Self {
            detections,
            count,
            status: "success".to_string(),
            gpu_enabled,
        }
    }
}

/// JSON body carried by every non-2xx response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
