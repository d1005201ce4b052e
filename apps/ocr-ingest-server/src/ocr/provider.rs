//! OCR Providers
//!
//! Defines the engine traits and implementations for the recognition backends.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;

use super::types::{OcrError, OcrSettings};
use crate::config::{OcrBackend, OcrConfig};

/// One configured recognition engine instance.
///
/// An instance is private to a single ingestion run. Resources it holds are
/// released when it is dropped.
#[async_trait]
pub trait RecognitionEngine: Send {
    /// Bind the image the next `recognize` call reads
    async fn set_image(&mut self, image: &Path) -> Result<(), OcrError>;

    /// Recognize the bound image
    async fn recognize(&mut self) -> Result<String, OcrError>;
}

/// Creates configured engine instances
pub trait EngineFactory: Send + Sync {
    fn open(&self, settings: &OcrSettings) -> Result<Box<dyn RecognitionEngine>, OcrError>;
}

/// Select the engine factory for the configured backend
pub fn engine_factory(config: &OcrConfig) -> Result<Arc<dyn EngineFactory>, OcrError> {
    match config.backend {
        OcrBackend::Cli => Ok(Arc::new(TesseractCliFactory::new(&config.program))),
        #[cfg(feature = "ocr-tesseract")]
        OcrBackend::Library => Ok(Arc::new(TesseractLibraryFactory)),
        #[cfg(not(feature = "ocr-tesseract"))]
        OcrBackend::Library => Err(OcrError::ProviderNotAvailable(
            "library backend requires the ocr-tesseract feature".to_string(),
        )),
    }
}

// ============================================================================
// Tesseract command line
// ============================================================================

/// Runs the `tesseract` binary once per page
#[derive(Debug, Clone)]
pub struct TesseractCliFactory {
    program: PathBuf,
}

impl TesseractCliFactory {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl EngineFactory for TesseractCliFactory {
    fn open(&self, settings: &OcrSettings) -> Result<Box<dyn RecognitionEngine>, OcrError> {
        Ok(Box::new(TesseractCliEngine {
            program: self.program.clone(),
            language: settings.language.clone(),
            page_seg_mode: settings.page_seg_mode,
            image: None,
        }))
    }
}

struct TesseractCliEngine {
    program: PathBuf,
    language: String,
    page_seg_mode: u8,
    image: Option<PathBuf>,
}

#[async_trait]
impl RecognitionEngine for TesseractCliEngine {
    async fn set_image(&mut self, image: &Path) -> Result<(), OcrError> {
        tokio::fs::metadata(image)
            .await
            .map_err(|e| OcrError::SetImageError {
                path: image.to_path_buf(),
                message: e.to_string(),
            })?;
        self.image = Some(image.to_path_buf());
        Ok(())
    }

    async fn recognize(&mut self) -> Result<String, OcrError> {
        let image = self.image.as_ref().ok_or(OcrError::NoImage)?;

        // Killed if the run is abandoned mid-page (deadline or dropped request)
        let output = Command::new(&self.program)
            .arg(image)
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .arg("--psm")
            .arg(self.page_seg_mode.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                OcrError::ProcessingError(format!(
                    "Failed to run {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::ProcessingError(format!(
                "Tesseract failed ({}): {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

// ============================================================================
// Tesseract library
// ============================================================================

/// Native libtesseract handle, initialized once per session
#[cfg(feature = "ocr-tesseract")]
pub struct TesseractLibraryFactory;

#[cfg(feature = "ocr-tesseract")]
impl EngineFactory for TesseractLibraryFactory {
    fn open(&self, settings: &OcrSettings) -> Result<Box<dyn RecognitionEngine>, OcrError> {
        let handle = tesseract::Tesseract::new(None, Some(&settings.language))
            .map_err(|e| OcrError::InitError(e.to_string()))?
            .set_variable("tessedit_pageseg_mode", &settings.page_seg_mode.to_string())
            .map_err(|e| OcrError::InitError(e.to_string()))?;

        Ok(Box::new(TesseractLibraryEngine {
            handle: Some(handle),
        }))
    }
}

#[cfg(feature = "ocr-tesseract")]
struct TesseractLibraryEngine {
    /// Taken while a blocking call is in flight
    handle: Option<tesseract::Tesseract>,
}

#[cfg(feature = "ocr-tesseract")]
impl TesseractLibraryEngine {
    fn take(&mut self) -> Result<tesseract::Tesseract, OcrError> {
        self.handle
            .take()
            .ok_or_else(|| OcrError::InitError("engine lost after a failed call".to_string()))
    }
}

#[cfg(feature = "ocr-tesseract")]
#[async_trait]
impl RecognitionEngine for TesseractLibraryEngine {
    async fn set_image(&mut self, image: &Path) -> Result<(), OcrError> {
        let handle = self.take()?;
        let path = image.to_path_buf();
        let display = path.to_string_lossy().into_owned();

        let handle = tokio::task::spawn_blocking(move || handle.set_image(&display))
            .await
            .map_err(|e| OcrError::ProcessingError(e.to_string()))?
            .map_err(|e| OcrError::SetImageError {
                path,
                message: e.to_string(),
            })?;

        self.handle = Some(handle);
        Ok(())
    }

    async fn recognize(&mut self) -> Result<String, OcrError> {
        let mut handle = self.take()?;

        let (handle, text) = tokio::task::spawn_blocking(move || {
            let text = handle.get_text();
            (handle, text)
        })
        .await
        .map_err(|e| OcrError::ProcessingError(e.to_string()))?;

        self.handle = Some(handle);
        text.map_err(|e| OcrError::ProcessingError(e.to_string()))
    }
}
