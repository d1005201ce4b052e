//! Test doubles for the ingestion pipeline

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use sqlx::SqlitePool;
use tempfile::TempDir;

use super::artifacts::ArtifactNamer;
use super::coordinator::IngestCoordinator;
use super::rasterizer::Rasterizer;
use super::reaper::{ArtifactReaper, ReaperHandle};
use super::types::{IngestError, UploadedPdf};
use crate::config::{CleanupConfig, Config};
use crate::db::{
    create_pool, Document, DocumentStore, ExtractedText, NewDocument, NewExtractedText,
    SqliteDocumentStore,
};
use crate::error::{AppError, Result};
use crate::ocr::mock::MockEngineFactory;
use crate::ocr::OcrSettings;
use crate::state::AppState;

const PAGE_MARKER: &[u8] = b"<< /Type /Page >>";
const ENCRYPT_MARKER: &[u8] = b"/Encrypt";

/// A minimal PDF body with `pages` page objects
pub fn fake_pdf(filename: &str, pages: usize) -> UploadedPdf {
    let mut data = b"%PDF-1.7\n".to_vec();
    for n in 0..pages {
        data.extend_from_slice(format!("{} 0 obj ", n + 3).as_bytes());
        data.extend_from_slice(PAGE_MARKER);
        data.extend_from_slice(b" endobj\n");
    }
    data.extend_from_slice(b"%%EOF\n");

    UploadedPdf {
        filename: filename.to_string(),
        content_type: "application/pdf".to_string(),
        data: Bytes::from(data),
    }
}

impl UploadedPdf {
    /// Mark the fake PDF as password protected
    pub fn encrypted(mut self) -> Self {
        let mut data = self.data.to_vec();
        data.extend_from_slice(b"trailer << ");
        data.extend_from_slice(ENCRYPT_MARKER);
        data.extend_from_slice(b" 9 0 R >>\n");
        self.data = Bytes::from(data);
        self
    }
}

fn count(haystack: &[u8], needle: &[u8]) -> usize {
    haystack.windows(needle.len()).filter(|w| *w == needle).count()
}

/// Writes one blank page image per page object in the source, named the way
/// `pdftoppm` names them. Refuses encrypted sources.
#[derive(Default)]
pub struct FakeRasterizer {
    calls: AtomicUsize,
}

impl FakeRasterizer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Rasterizer for FakeRasterizer {
    async fn rasterize(&self, source: &Path, page_prefix: &Path) -> std::result::Result<(), IngestError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let data = tokio::fs::read(source)
            .await
            .map_err(|_| IngestError::SourceNotFound(source.to_path_buf()))?;

        if count(&data, ENCRYPT_MARKER) > 0 {
            return Err(IngestError::ConversionFailed {
                reason: "exit status: 1".to_string(),
                stderr: "Command Line Error: Incorrect password".to_string(),
            });
        }

        let pages = count(&data, PAGE_MARKER);
        let width = pages.to_string().len();
        for page in 1..=pages {
            let name = format!("{}-{:0width$}.png", page_prefix.display(), page);
            tokio::fs::write(name, b"\x89PNG\r\n\x1a\n")
                .await
                .map_err(|e| IngestError::Storage(e.to_string()))?;
        }

        Ok(())
    }
}

/// Store that can be told to reject either write
pub struct FlakyStore {
    inner: SqliteDocumentStore,
    fail_documents: bool,
    fail_extracted_text: bool,
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn create_document(&self, new: &NewDocument) -> Result<Document> {
        if self.fail_documents {
            return Err(AppError::Internal("disk I/O error".to_string()));
        }
        self.inner.create_document(new).await
    }

    async fn create_extracted_text(&self, new: &NewExtractedText) -> Result<ExtractedText> {
        if self.fail_extracted_text {
            return Err(AppError::Internal("disk I/O error".to_string()));
        }
        self.inner.create_extracted_text(new).await
    }
}

/// A coordinator wired to fakes, an in-memory database and a temp directory
pub struct Harness {
    pub dir: TempDir,
    pub pool: SqlitePool,
    pub engines: Arc<MockEngineFactory>,
    pub rasterizer: Arc<FakeRasterizer>,
    pub store: Arc<dyn DocumentStore>,
    pub reaper: ReaperHandle,
    pub coordinator: IngestCoordinator,
}

pub struct HarnessBuilder {
    engines: MockEngineFactory,
    fail_documents: bool,
    fail_extracted_text: bool,
}

impl HarnessBuilder {
    pub fn fail_documents(mut self) -> Self {
        self.fail_documents = true;
        self
    }

    pub fn fail_extracted_text(mut self) -> Self {
        self.fail_extracted_text = true;
        self
    }

    pub async fn build(self) -> Harness {
        let dir = TempDir::new().unwrap();
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let namer = ArtifactNamer::new(dir.path().join("uploads"));

        let cleanup = CleanupConfig {
            max_concurrent: 2,
            queue_capacity: 16,
            sweep_interval: Duration::from_secs(3600),
            stale_after: Duration::from_secs(86400),
        };
        let reaper = Arc::new(ArtifactReaper::new(namer.clone())).spawn(&cleanup);

        let engines = Arc::new(self.engines);
        let rasterizer = Arc::new(FakeRasterizer::default());
        let store: Arc<dyn DocumentStore> = Arc::new(FlakyStore {
            inner: SqliteDocumentStore::new(pool.clone()),
            fail_documents: self.fail_documents,
            fail_extracted_text: self.fail_extracted_text,
        });

        let coordinator = IngestCoordinator::new(
            namer,
            rasterizer.clone(),
            engines.clone(),
            OcrSettings::default(),
            store.clone(),
            reaper.clone(),
        );

        Harness {
            dir,
            pool,
            engines,
            rasterizer,
            store,
            reaper,
            coordinator,
        }
    }
}

impl Harness {
    pub async fn new(engines: MockEngineFactory) -> Self {
        Self::builder(engines).build().await
    }

    pub fn builder(engines: MockEngineFactory) -> HarnessBuilder {
        HarnessBuilder {
            engines,
            fail_documents: false,
            fail_extracted_text: false,
        }
    }

    /// A second coordinator sharing everything but the artifact directory
    pub fn coordinator_at(&self, root: impl Into<PathBuf>) -> IngestCoordinator {
        IngestCoordinator::new(
            ArtifactNamer::new(root),
            self.rasterizer.clone(),
            self.engines.clone(),
            OcrSettings::default(),
            self.store.clone(),
            self.reaper.clone(),
        )
    }

    /// Files left in the artifact directory
    pub fn artifacts(&self) -> Vec<PathBuf> {
        match std::fs::read_dir(self.coordinator.namer().root()) {
            Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        }
    }
}

/// Application state over a [`Harness`], for router tests
pub struct TestApp {
    /// Keeps the artifact directory alive
    _dir: TempDir,
    pub pool: SqlitePool,
    pub engines: Arc<MockEngineFactory>,
    pub state: AppState,
}

impl Harness {
    pub fn into_app(self) -> TestApp {
        self.into_app_with(Config::default())
    }

    pub fn into_app_with(self, config: Config) -> TestApp {
        let state = AppState::new(config, self.coordinator, self.reaper);

        TestApp {
            _dir: self.dir,
            pool: self.pool,
            engines: self.engines,
            state,
        }
    }
}
