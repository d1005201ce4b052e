//! Ingestion pipeline types

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use axum::body::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ocr::OcrError;

// ============================================================================
// Identity
// ============================================================================

/// Identifier of one uploaded document.
///
/// Always rendered in the canonical hyphenated lowercase form, which is the
/// token embedded in every artifact file name for the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(Uuid);

impl DocumentId {
    /// Generate a fresh, never-reused identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Returned when a string is not a canonical document identifier
#[derive(Debug, thiserror::Error)]
#[error("not a canonical document id: {0:?}")]
pub struct InvalidDocumentId(String);

impl FromStr for DocumentId {
    type Err = InvalidDocumentId;

    /// Only the canonical form is accepted so that parsing a file-name token
    /// and formatting it back yields the same string.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Uuid::try_parse(s) {
            Ok(uuid) if uuid.hyphenated().to_string() == s => Ok(Self(uuid)),
            _ => Err(InvalidDocumentId(s.to_string())),
        }
    }
}

// ============================================================================
// Pipeline input / output
// ============================================================================

/// A PDF received from the HTTP layer
#[derive(Debug, Clone)]
pub struct UploadedPdf {
    pub filename: String,
    pub content_type: String,
    pub data: Bytes,
}

/// Result of a successful ingestion run
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub document_id: DocumentId,
    pub content: String,
    pub page_count: usize,
}

/// One rasterized page on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    /// 1-based page number parsed from the file name
    pub index: u32,
    pub path: PathBuf,
}

/// Progress of one run through the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IngestStage {
    Received,
    Stored,
    Rasterized,
    Recognized,
    Persisted,
    Completed,
}

// ============================================================================
// Error Types
// ============================================================================

/// Failure of one pipeline stage. Every variant aborts the run.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to store upload: {0}")]
    Storage(String),

    #[error("PDF file not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("failed to store {entity}: {message}")]
    Persistence {
        entity: &'static str,
        message: String,
    },

    #[error("failed to convert pdf to images: {reason} (stderr: {stderr})")]
    ConversionFailed { reason: String, stderr: String },

    #[error("no images generated from PDF")]
    NoPagesProduced,

    #[error("failed to start OCR engine: {0}")]
    EngineUnavailable(#[source] OcrError),

    #[error("ocr error on page {page} ({image}): {source}")]
    Ocr {
        page: u32,
        image: String,
        #[source]
        source: OcrError,
    },

    #[error("No extractable text found in PDF")]
    EmptyExtraction,

    #[error("ingestion run did not finish: {0}")]
    Interrupted(String),
}

impl IngestError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::EmptyExtraction => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Storage(_)
            | Self::SourceNotFound(_)
            | Self::Persistence { .. }
            | Self::ConversionFailed { .. }
            | Self::NoPagesProduced
            | Self::EngineUnavailable(_)
            | Self::Ocr { .. }
            | Self::Interrupted(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Storage(_) => "STORAGE_ERROR",
            Self::SourceNotFound(_) => "SOURCE_NOT_FOUND",
            Self::Persistence { .. } => "PERSISTENCE_ERROR",
            Self::ConversionFailed { .. } => "CONVERSION_FAILED",
            Self::NoPagesProduced => "NO_PAGES_PRODUCED",
            Self::EngineUnavailable(_) | Self::Ocr { .. } => "OCR_ERROR",
            Self::EmptyExtraction => "EMPTY_EXTRACTION",
            Self::Interrupted(_) => "INTERNAL_ERROR",
        }
    }
}
