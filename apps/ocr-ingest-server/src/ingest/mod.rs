//! PDF ingestion pipeline
//!
//! An upload is stored, recorded, rasterized into page images, recognized
//! page by page and persisted as one block of text. Transient files are
//! named per document so concurrent runs never see each other's pages, and
//! are deleted in the background once a run ends.

mod artifacts;
mod coordinator;
mod pages;
mod rasterizer;
mod reaper;
mod session;
mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use artifacts::{ArtifactKind, ArtifactNamer, ArtifactPaths};
pub use coordinator::IngestCoordinator;
pub use pages::{enumerate_pages, scan_page_images};
pub use rasterizer::{PdftoppmRasterizer, Rasterizer};
pub use reaper::{ArtifactReaper, ReapReport, ReaperHandle};
pub use session::{OcrSession, PAGE_SEPARATOR};
pub use types::{
    DocumentId, IngestError, IngestReport, IngestStage, InvalidDocumentId, PageImage, UploadedPdf,
};
