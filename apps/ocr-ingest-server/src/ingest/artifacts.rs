//! Artifact naming
//!
//! Every transient file of an ingestion run lives directly under the artifact
//! directory and embeds the document id as a literal token:
//!
//! - `<id>.pdf`: the uploaded source
//! - `<id>_page-<N>.png`: rasterized pages (written by the rasterizer from the
//!   `<id>_page` prefix)
//!
//! Ids have a fixed canonical length and are followed by a fixed separator, so
//! the matcher for one document can never accept another document's files.

use std::path::{Path, PathBuf};

use super::types::DocumentId;

const SOURCE_EXTENSION: &str = ".pdf";
const PAGE_MARKER: &str = "_page";
const PAGE_SEPARATOR: &str = "-";
const PAGE_EXTENSION: &str = ".png";

/// Kind of artifact recognized from a bare file name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Source,
    Page(u32),
}

/// Derives artifact paths for documents under one root directory
#[derive(Debug, Clone)]
pub struct ArtifactNamer {
    root: PathBuf,
}

impl ArtifactNamer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding all artifacts
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Paths for one document
    pub fn paths(&self, document_id: &DocumentId) -> ArtifactPaths {
        let token = document_id.to_string();
        ArtifactPaths {
            document_id: *document_id,
            source: self.root.join(format!("{token}{SOURCE_EXTENSION}")),
            page_prefix: self.root.join(format!("{token}{PAGE_MARKER}")),
            page_file_prefix: format!("{token}{PAGE_MARKER}{PAGE_SEPARATOR}"),
        }
    }

    /// Recognize any artifact file name, whatever document it belongs to.
    ///
    /// Names that do not embed a canonical document id are rejected, so
    /// foreign files sharing the directory are never classified.
    pub fn classify(file_name: &str) -> Option<(DocumentId, ArtifactKind)> {
        if let Some(stem) = file_name.strip_suffix(SOURCE_EXTENSION) {
            let id = stem.parse().ok()?;
            return Some((id, ArtifactKind::Source));
        }

        let marker = format!("{PAGE_MARKER}{PAGE_SEPARATOR}");
        let (stem, rest) = file_name.split_once(&marker)?;
        let id = stem.parse().ok()?;
        let index = parse_page_number(rest)?;
        Some((id, ArtifactKind::Page(index)))
    }
}

/// Artifact locations for one document
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub document_id: DocumentId,
    /// Stored upload
    pub source: PathBuf,
    /// Prefix handed to the rasterizer
    pub page_prefix: PathBuf,
    page_file_prefix: String,
}

impl ArtifactPaths {
    /// Directory the page images are written to
    pub fn page_dir(&self) -> &Path {
        match self.page_prefix.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }

    /// Page number of `file_name` if it is one of this document's page images
    pub fn page_index(&self, file_name: &str) -> Option<u32> {
        file_name
            .strip_prefix(&self.page_file_prefix)
            .and_then(parse_page_number)
    }

    /// Page image file name as emitted by the rasterizer, zero-padded to `width`
    pub fn page_file_name(&self, index: u32, width: usize) -> String {
        format!("{}{index:0width$}{PAGE_EXTENSION}", self.page_file_prefix)
    }
}

/// `"<digits>.png"` -> page number
fn parse_page_number(rest: &str) -> Option<u32> {
    let digits = rest.strip_suffix(PAGE_EXTENSION)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
