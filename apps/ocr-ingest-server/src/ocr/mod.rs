//! OCR Module
//!
//! Recognition engines used to read text from rasterized PDF pages.
//!
//! Supports two backends:
//! - Tesseract command line (default, requires `tesseract` in PATH)
//! - Native libtesseract (cargo feature `ocr-tesseract`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ocr_ingest_server::ocr::{engine_factory, OcrSettings};
//!
//! let factory = engine_factory(&config.ocr)?;
//! let mut engine = factory.open(&OcrSettings::from(&config.ocr))?;
//! engine.set_image(Path::new("uploads/page-1.png")).await?;
//! let text = engine.recognize().await?;
//! ```

mod provider;
mod types;

pub use provider::{engine_factory, EngineFactory, RecognitionEngine, TesseractCliFactory};
pub use types::{OcrError, OcrSettings};

#[cfg(feature = "ocr-tesseract")]
pub use provider::TesseractLibraryFactory;

#[cfg(test)]
pub use provider::mock;
