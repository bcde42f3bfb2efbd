//! Configuration types for the OCR endpoint.

use std::path::PathBuf;

pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_MAX_DIMENSION: u32 = 4096;

/// Configuration for the OCR engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub det_model: PathBuf,
    pub rec_model: PathBuf,
    pub dict_path: PathBuf,
    /// Device to run inference on: `cpu`, `cuda`, or `cuda:N`.
    pub device: String,
}

impl EngineConfig {
    /// Whether the configured device runs accelerated (GPU) inference.
    pub fn accelerated(&self) -> bool {
        self.device.to_lowercase().starts_with("cuda")
    }
}

/// Input limits enforced before an image reaches the engine.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Maximum decoded payload size in bytes.
    pub max_payload_bytes: usize,
    /// Maximum pixel size per axis.
    pub max_dimension: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }
}

/// Configuration for the HTTP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub engine: EngineConfig,
    pub host: String,
    pub port: u16,
    pub limits: Limits,
}
