//! Lazy construction and serialized invocation of the OCR engine.

use std::sync::{Mutex, OnceLock};

use image::RgbImage;
use thiserror::Error;
use tracing::{error, info};

#[cfg(feature = "cuda")]
use oar_ocr::core::config::OrtExecutionProvider;
use oar_ocr::core::config::OrtSessionConfig;
use oar_ocr::oarocr::{OAROCRBuilder, OAROCR};

use crate::api::Detection;
use crate::config::EngineConfig;
use crate::error::PredictError;

/// Errors raised while building or invoking the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("invalid engine configuration: {0}")]
    Config(String),

    #[error("inference failed: {0}")]
    Inference(String),
}

/// The detect+recognize seam between the HTTP layer and the OCR library.
pub trait TextEngine: Send + Sync {
    fn recognize(&self, image: &RgbImage) -> Result<Vec<Detection>, EngineError>;
}

/// `TextEngine` backed by the oar-ocr pipeline.
///
/// The library's behavior under concurrent invocation is unverified, so
/// every call goes through a mutex and inference is serialized per process.
pub struct OarEngine {
    ocr: Mutex<OAROCR>,
}

impl OarEngine {
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        if !config.det_model.exists() {
            return Err(EngineError::ModelNotFound(format!(
                "detection model not found: {}",
                config.det_model.display()
            )));
        }
        if !config.rec_model.exists() {
            return Err(EngineError::ModelNotFound(format!(
                "recognition model not found: {}",
                config.rec_model.display()
            )));
        }
        if !config.dict_path.exists() {
            return Err(EngineError::ModelNotFound(format!(
                "dictionary file not found: {}",
                config.dict_path.display()
            )));
        }

        let mut builder =
            OAROCRBuilder::new(&config.det_model, &config.rec_model, &config.dict_path);

        if let Some(ort_config) = ort_session_for_device(&config.device)? {
            builder = builder.ort_session(ort_config);
        }

        let ocr = builder
            .build()
            .map_err(|e| EngineError::Config(e.to_string()))?;

        Ok(Self {
            ocr: Mutex::new(ocr),
        })
    }
}

impl TextEngine for OarEngine {
    fn recognize(&self, image: &RgbImage) -> Result<Vec<Detection>, EngineError> {
        let ocr = self
            .ocr
            .lock()
            .map_err(|_| EngineError::Inference("engine lock poisoned".to_string()))?;

        let results = ocr
            .predict(vec![image.clone()])
            .map_err(|e| EngineError::Inference(e.to_string()))?;

        // No result for the image counts as zero detections, not a failure.
        let Some(result) = results.into_iter().next() else {
            return Ok(Vec::new());
        };

        Ok(result
            .text_regions
            .iter()
            .map(|region| Detection {
                bbox: region
                    .bounding_box
                    .points
                    .iter()
                    .map(|point| [point.x, point.y])
                    .collect(),
                text: region
                    .text
                    .as_ref()
                    .map(|text| text.to_string())
                    .unwrap_or_default(),
                confidence: region.confidence.unwrap_or(0.0),
            })
            .collect())
    }
}

/// Owns the single engine instance for the process lifetime.
///
/// Construction is attempted exactly once. A failure is recorded and every
/// later request observes `EngineUnavailable` until the process restarts;
/// there is no automatic retry.
pub struct EngineAdapter {
    config: Option<EngineConfig>,
    engine: OnceLock<Result<Box<dyn TextEngine>, String>>,
    accelerated: bool,
}

impl EngineAdapter {
    /// Adapter that builds an `OarEngine` from `config` on first use.
    pub fn from_config(config: EngineConfig) -> Self {
        let accelerated = config.accelerated();
        Self {
            config: Some(config),
            engine: OnceLock::new(),
            accelerated,
        }
    }

    /// Adapter around an already-constructed engine.
    #[cfg(test)]
    pub(crate) fn from_engine(engine: Box<dyn TextEngine>, accelerated: bool) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(Ok(engine));
        Self {
            config: None,
            engine: cell,
            accelerated,
        }
    }

    /// Attempt initialization eagerly; the server still starts on failure.
    pub fn warm_up(&self) {
        match self.engine() {
            Ok(_) => info!(accelerated = self.accelerated, "OCR engine initialized"),
            Err(e) => error!(error = %e, "OCR engine failed to initialize"),
        }
    }

    /// Run detect+recognize on a validated, channel-correct image.
    pub fn invoke(&self, image: &RgbImage) -> Result<Vec<Detection>, PredictError> {
        let engine = self.engine()?;
        engine
            .recognize(image)
            .map_err(|e| PredictError::Inference(e.to_string()))
    }

    /// Whether the configured device runs accelerated inference.
    pub fn accelerated(&self) -> bool {
        self.accelerated
    }

    fn engine(&self) -> Result<&dyn TextEngine, PredictError> {
        let slot = self.engine.get_or_init(|| match &self.config {
            Some(config) => OarEngine::new(config)
                .map(|engine| Box::new(engine) as Box<dyn TextEngine>)
                .map_err(|e| e.to_string()),
            None => Err("no engine configured".to_string()),
        });

        match slot {
            Ok(engine) => Ok(engine.as_ref()),
            Err(reason) => Err(PredictError::EngineUnavailable(reason.clone())),
        }
    }
}

/// Translate a device string into an ONNX Runtime session configuration.
fn ort_session_for_device(device: &str) -> Result<Option<OrtSessionConfig>, EngineError> {
    let device_lower = device.to_lowercase();

    if device_lower == "cpu" {
        return Ok(None);
    }

    #[cfg(feature = "cuda")]
    {
        if let Some(rest) = device_lower.strip_prefix("cuda") {
            let device_id = if rest.is_empty() {
                0
            } else if let Some(id) = rest.strip_prefix(':') {
                id.parse::<i32>().map_err(|_| {
                    EngineError::Config(format!("invalid CUDA device id: {device}"))
                })?
            } else {
                return Err(EngineError::Config(format!(
                    "invalid device format: {device}, expected 'cuda' or 'cuda:N'"
                )));
            };

            let config = OrtSessionConfig::new().with_execution_providers(vec![
                OrtExecutionProvider::CUDA {
                    device_id: Some(device_id),
                    gpu_mem_limit: None,
                    arena_extend_strategy: None,
                    cudnn_conv_algo_search: None,
                    do_copy_in_default_stream: None,
                    cudnn_conv_use_max_workspace: None,
                },
                OrtExecutionProvider::CPU,
            ]);

            return Ok(Some(config));
        }
    }

    #[cfg(not(feature = "cuda"))]
    {
        if device_lower.starts_with("cuda") {
            return Err(EngineError::Config(format!(
                "CUDA device '{device}' requested but the cuda feature is not enabled"
            )));
        }
    }

    Err(EngineError::Config(format!(
        "unsupported device: {device}"
    )))
}
