//! OCR Types

use std::path::PathBuf;
use std::time::Duration;

use crate::config::OcrConfig;

/// Engine settings applied once per session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrSettings {
    /// Tesseract language code(s), e.g. "eng" or "eng+deu"
    pub language: String,
    /// Tesseract page segmentation mode (3 = fully automatic)
    pub page_seg_mode: u8,
    /// Upper bound for recognizing one page
    pub page_timeout: Option<Duration>,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            page_seg_mode: 3,
            page_timeout: None,
        }
    }
}

impl From<&OcrConfig> for OcrSettings {
    fn from(config: &OcrConfig) -> Self {
        Self {
            language: config.language.clone(),
            page_seg_mode: config.page_seg_mode,
            page_timeout: config.page_timeout,
        }
    }
}

/// OCR error types
#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("OCR provider not available: {0}")]
    ProviderNotAvailable(String),

    #[error("Failed to initialize OCR engine: {0}")]
    InitError(String),

    #[error("Failed to set image {}: {message}", .path.display())]
    SetImageError { path: PathBuf, message: String },

    #[error("No image bound to the OCR engine")]
    NoImage,

    #[error("OCR processing failed: {0}")]
    ProcessingError(String),

    #[error("OCR timed out after {0:?}")]
    Timeout(Duration),
}
