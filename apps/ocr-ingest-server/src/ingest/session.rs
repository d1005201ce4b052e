//! OCR session over one document's pages

use super::types::{IngestError, PageImage};
use crate::ocr::{EngineFactory, OcrError, OcrSettings, RecognitionEngine};

/// Separator appended after every page's text
pub const PAGE_SEPARATOR: &str = "\n\n";

/// A configured engine bound to one ingestion run.
///
/// The engine is owned by the session and released when the session is
/// consumed by [`OcrSession::recognize_pages`] or dropped, whichever happens
/// first. That covers success, errors and a cancelled request alike.
pub struct OcrSession {
    engine: Box<dyn RecognitionEngine>,
    settings: OcrSettings,
}

impl OcrSession {
    /// Configure a fresh engine instance
    pub fn open(factory: &dyn EngineFactory, settings: &OcrSettings) -> Result<Self, IngestError> {
        let engine = factory
            .open(settings)
            .map_err(IngestError::EngineUnavailable)?;

        Ok(Self {
            engine,
            settings: settings.clone(),
        })
    }

    /// Recognize every page in order and return the trimmed concatenation.
    ///
    /// The first page that fails aborts the whole document; text already
    /// recognized for earlier pages is discarded.
    pub async fn recognize_pages(mut self, pages: &[PageImage]) -> Result<String, IngestError> {
        let mut all_text = String::new();

        for page in pages {
            let text = self.recognize_page(page).await.map_err(|source| IngestError::Ocr {
                page: page.index,
                image: page.path.display().to_string(),
                source,
            })?;

            tracing::debug!(
                page = page.index,
                chars = text.len(),
                "Page recognized"
            );

            all_text.push_str(&text);
            all_text.push_str(PAGE_SEPARATOR);
        }

        let content = all_text.trim();
        if content.is_empty() {
            return Err(IngestError::EmptyExtraction);
        }

        Ok(content.to_string())
    }

    async fn recognize_page(&mut self, page: &PageImage) -> Result<String, OcrError> {
        self.engine.set_image(&page.path).await?;

        match self.settings.page_timeout {
            Some(limit) => tokio::time::timeout(limit, self.engine.recognize())
                .await
                .map_err(|_| OcrError::Timeout(limit))?,
            None => self.engine.recognize().await,
        }
    }
}
