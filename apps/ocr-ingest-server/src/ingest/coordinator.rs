//! Ingestion Coordinator
//!
//! Drives one upload through store -> record -> rasterize -> recognize ->
//! persist. Any stage failure aborts the run. Once the document row exists,
//! its artifacts are handed to the reaper whatever the outcome.
//!
//! Runs execute on their own task: a caller that stops waiting (a dropped
//! HTTP request) does not interrupt them.

use std::sync::Arc;

use uuid::Uuid;

use super::artifacts::{ArtifactNamer, ArtifactPaths};
use super::pages::enumerate_pages;
use super::rasterizer::Rasterizer;
use super::reaper::ReaperHandle;
use super::session::OcrSession;
use super::types::{DocumentId, IngestError, IngestReport, IngestStage, UploadedPdf};
use crate::db::{DocumentStore, NewDocument, NewExtractedText};
use crate::ocr::{EngineFactory, OcrSettings};

/// Runs the ingestion pipeline for uploaded PDFs
#[derive(Clone)]
pub struct IngestCoordinator {
    inner: Arc<Pipeline>,
}

struct Pipeline {
    namer: ArtifactNamer,
    rasterizer: Arc<dyn Rasterizer>,
    engines: Arc<dyn EngineFactory>,
    ocr: OcrSettings,
    store: Arc<dyn DocumentStore>,
    reaper: ReaperHandle,
}

/// Schedules cleanup for a recorded document when dropped, so a run that
/// ends early (error or panic) still releases its artifacts.
struct ReapOnDrop<'a> {
    reaper: &'a ReaperHandle,
    document_id: DocumentId,
}

impl Drop for ReapOnDrop<'_> {
    fn drop(&mut self) {
        self.reaper.schedule(self.document_id);
    }
}

impl IngestCoordinator {
    pub fn new(
        namer: ArtifactNamer,
        rasterizer: Arc<dyn Rasterizer>,
        engines: Arc<dyn EngineFactory>,
        ocr: OcrSettings,
        store: Arc<dyn DocumentStore>,
        reaper: ReaperHandle,
    ) -> Self {
        Self {
            inner: Arc::new(Pipeline {
                namer,
                rasterizer,
                engines,
                ocr,
                store,
                reaper,
            }),
        }
    }

    pub fn namer(&self) -> &ArtifactNamer {
        &self.inner.namer
    }

    /// Ingest one PDF on behalf of `owner`.
    ///
    /// On success the document row and exactly one extracted text row exist.
    /// On failure no extracted text row exists; the document row may.
    /// Dropping the returned future leaves the run going to completion.
    pub async fn ingest(&self, owner: &str, upload: UploadedPdf) -> Result<IngestReport, IngestError> {
        let pipeline = Arc::clone(&self.inner);
        let owner = owner.to_string();

        let run = tokio::spawn(async move { pipeline.run(&owner, upload).await });

        match run.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "Ingestion task failed");
                Err(IngestError::Interrupted(e.to_string()))
            }
        }
    }
}

impl Pipeline {
    async fn run(&self, owner: &str, upload: UploadedPdf) -> Result<IngestReport, IngestError> {
        let document_id = DocumentId::new();
        let paths = self.namer.paths(&document_id);

        tracing::info!(
            document_id = %document_id,
            owner,
            filename = %upload.filename,
            bytes = upload.data.len(),
            stage = ?IngestStage::Received,
            "Upload received"
        );

        self.store_source(&paths, &upload).await?;
        tracing::debug!(
            document_id = %document_id,
            path = %paths.source.display(),
            stage = ?IngestStage::Stored,
            "Source stored"
        );

        let record = NewDocument {
            id: document_id.to_string(),
            user_id: owner.to_string(),
            filename: upload.filename,
            file_type: upload.content_type,
        };
        if let Err(e) = self.store.create_document(&record).await {
            // Nothing references the blob yet, so it goes now
            discard_source(&paths).await;
            return Err(IngestError::Persistence {
                entity: "document",
                message: e.to_string(),
            });
        }

        // Declared before the session exists, so the engine is torn down first
        let _reap = ReapOnDrop {
            reaper: &self.reaper,
            document_id,
        };

        let mut stage = IngestStage::Stored;
        match self.process(&paths, &mut stage).await {
            Ok(report) => {
                tracing::info!(
                    document_id = %document_id,
                    pages = report.page_count,
                    chars = report.content.len(),
                    stage = ?IngestStage::Completed,
                    "Ingestion completed"
                );
                Ok(report)
            }
            Err(e) => {
                tracing::warn!(
                    document_id = %document_id,
                    failed_after = ?stage,
                    code = e.code(),
                    error = %e,
                    "Ingestion aborted"
                );
                Err(e)
            }
        }
    }

    async fn store_source(&self, paths: &ArtifactPaths, upload: &UploadedPdf) -> Result<(), IngestError> {
        tokio::fs::create_dir_all(self.namer.root())
            .await
            .map_err(|e| IngestError::Storage(format!("failed to create upload dir: {}", e)))?;

        if let Err(e) = tokio::fs::write(&paths.source, &upload.data).await {
            discard_source(paths).await;
            return Err(IngestError::Storage(format!("failed to write file: {}", e)));
        }

        Ok(())
    }

    async fn process(&self, paths: &ArtifactPaths, stage: &mut IngestStage) -> Result<IngestReport, IngestError> {
        let document_id = paths.document_id;

        self.rasterizer
            .rasterize(&paths.source, &paths.page_prefix)
            .await?;
        let pages = enumerate_pages(paths).await?;
        *stage = IngestStage::Rasterized;
        tracing::debug!(document_id = %document_id, pages = pages.len(), "PDF rasterized");

        let session = OcrSession::open(self.engines.as_ref(), &self.ocr)?;
        let content = session.recognize_pages(&pages).await?;
        *stage = IngestStage::Recognized;
        tracing::debug!(document_id = %document_id, chars = content.len(), "Pages recognized");

        let text = NewExtractedText {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.to_string(),
            content,
        };
        self.store
            .create_extracted_text(&text)
            .await
            .map_err(|e| IngestError::Persistence {
                entity: "extracted text",
                message: e.to_string(),
            })?;
        *stage = IngestStage::Persisted;

        Ok(IngestReport {
            document_id,
            content: text.content,
            page_count: pages.len(),
        })
    }
}

async fn discard_source(paths: &ArtifactPaths) {
    match tokio::fs::remove_file(&paths.source).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(
            document_id = %paths.document_id,
            path = %paths.source.display(),
            error = %e,
            "Failed to discard source PDF"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DocumentRepository, ExtractedTextRepository};
    use crate::ingest::testing::{fake_pdf, Harness};
    use crate::ocr::mock::MockEngineFactory;

    async fn text_rows(harness: &Harness, id: &DocumentId) -> usize {
        ExtractedTextRepository::new(&harness.pool)
            .list_for_document(&id.to_string())
            .await
            .unwrap()
            .len()
    }

    async fn document_exists(harness: &Harness, id: &DocumentId) -> bool {
        DocumentRepository::new(&harness.pool)
            .get(&id.to_string())
            .await
            .unwrap()
            .is_some()
    }

    async fn only_document(harness: &Harness) -> DocumentId {
        let ids: Vec<(String,)> = sqlx::query_as("SELECT id FROM documents")
            .fetch_all(&harness.pool)
            .await
            .unwrap();
        assert_eq!(ids.len(), 1);
        ids[0].0.parse().unwrap()
    }

    #[tokio::test]
    async fn test_three_page_invoice() {
        let engines = MockEngineFactory::new()
            .page(1, "Invoice #1\n")
            .page(2, "Line items")
            .page(3, "Total: 42\n");
        let harness = Harness::new(engines).await;

        let report = harness
            .coordinator
            .ingest("alice", fake_pdf("invoice.pdf", 3))
            .await
            .unwrap();

        assert_eq!(report.content, "Invoice #1\n\n\nLine items\n\nTotal: 42");
        assert_eq!(report.page_count, 3);
        assert!(document_exists(&harness, &report.document_id).await);
        assert_eq!(text_rows(&harness, &report.document_id).await, 1);

        let stored = DocumentRepository::new(&harness.pool)
            .get(&report.document_id.to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.user_id, "alice");
        assert_eq!(stored.filename.as_deref(), Some("invoice.pdf"));
        assert_eq!(stored.file_type.as_deref(), Some("application/pdf"));

        harness.reaper.flush().await;
        assert!(harness.artifacts().is_empty());
        assert_eq!(harness.engines.live_engines(), 0);
    }

    #[tokio::test]
    async fn test_pages_recognized_in_numeric_order() {
        let mut engines = MockEngineFactory::new();
        for page in 1..=12 {
            engines = engines.page(page, &format!("page {page}"));
        }
        let harness = Harness::new(engines).await;

        let report = harness
            .coordinator
            .ingest("alice", fake_pdf("long.pdf", 12))
            .await
            .unwrap();

        assert_eq!(harness.engines.recognized(), (1..=12).collect::<Vec<_>>());
        assert!(report.content.starts_with("page 1\n\npage 2\n\n"));
        assert!(report.content.ends_with("page 11\n\npage 12"));
    }

    #[tokio::test]
    async fn test_zero_pages_skips_ocr() {
        let harness = Harness::new(MockEngineFactory::new()).await;

        let result = harness.coordinator.ingest("alice", fake_pdf("blank.pdf", 0)).await;

        assert!(matches!(result, Err(IngestError::NoPagesProduced)));
        assert_eq!(harness.engines.opened(), 0);

        let id = only_document(&harness).await;
        assert_eq!(text_rows(&harness, &id).await, 0);

        harness.reaper.flush().await;
        assert!(harness.artifacts().is_empty());
    }

    #[tokio::test]
    async fn test_failing_page_aborts_without_text_row() {
        let engines = MockEngineFactory::new()
            .page(1, "First")
            .failing_page(2, "segfault")
            .page(3, "Third");
        let harness = Harness::new(engines).await;

        let result = harness.coordinator.ingest("alice", fake_pdf("scan.pdf", 3)).await;

        assert!(matches!(result, Err(IngestError::Ocr { page: 2, .. })));
        let id = only_document(&harness).await;
        assert_eq!(text_rows(&harness, &id).await, 0);
        assert_eq!(harness.engines.live_engines(), 0);

        harness.reaper.flush().await;
        assert!(harness.artifacts().is_empty());
    }

    #[tokio::test]
    async fn test_blank_scan_is_empty_extraction() {
        let engines = MockEngineFactory::new().page(1, "  \n").page(2, "\n");
        let harness = Harness::new(engines).await;

        let result = harness.coordinator.ingest("alice", fake_pdf("blank.pdf", 2)).await;

        let err = result.unwrap_err();
        assert!(matches!(err, IngestError::EmptyExtraction));
        assert_eq!(err.status_code(), axum::http::StatusCode::UNPROCESSABLE_ENTITY);

        let id = only_document(&harness).await;
        assert!(document_exists(&harness, &id).await);
        assert_eq!(text_rows(&harness, &id).await, 0);

        harness.reaper.flush().await;
        assert!(harness.artifacts().is_empty());
    }

    #[tokio::test]
    async fn test_conversion_failure_keeps_document_row() {
        let harness = Harness::new(MockEngineFactory::new()).await;

        let result = harness
            .coordinator
            .ingest("alice", fake_pdf("locked.pdf", 2).encrypted())
            .await;

        match result {
            Err(IngestError::ConversionFailed { stderr, .. }) => {
                assert!(stderr.contains("Incorrect password"))
            }
            other => panic!("expected conversion failure, got {other:?}"),
        }
        let id = only_document(&harness).await;
        assert_eq!(text_rows(&harness, &id).await, 0);
        assert_eq!(harness.engines.opened(), 0);

        harness.reaper.flush().await;
        assert!(harness.artifacts().is_empty());
    }

    #[tokio::test]
    async fn test_document_persist_failure_removes_blob() {
        let harness = Harness::builder(MockEngineFactory::new())
            .fail_documents()
            .build()
            .await;

        let result = harness.coordinator.ingest("alice", fake_pdf("a.pdf", 1)).await;

        assert!(matches!(
            result,
            Err(IngestError::Persistence {
                entity: "document",
                ..
            })
        ));
        // Removed synchronously, no flush needed
        assert!(harness.artifacts().is_empty());
        assert_eq!(harness.rasterizer.calls(), 0);
    }

    #[tokio::test]
    async fn test_text_persist_failure_reaps_artifacts() {
        let harness = Harness::builder(MockEngineFactory::new().page(1, "text"))
            .fail_extracted_text()
            .build()
            .await;

        let result = harness.coordinator.ingest("alice", fake_pdf("a.pdf", 1)).await;

        assert!(matches!(
            result,
            Err(IngestError::Persistence {
                entity: "extracted text",
                ..
            })
        ));
        harness.reaper.flush().await;
        assert!(harness.artifacts().is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_before_any_row() {
        let harness = Harness::new(MockEngineFactory::new()).await;
        // A plain file where the artifact directory should be
        let blocked = harness.dir.path().join("blocked");
        std::fs::write(&blocked, b"").unwrap();
        let coordinator = harness.coordinator_at(blocked.join("uploads"));

        let result = coordinator.ingest("alice", fake_pdf("a.pdf", 1)).await;

        assert!(matches!(result, Err(IngestError::Storage(_))));
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM documents")
            .fetch_one(&harness.pool)
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }

    #[tokio::test]
    async fn test_concurrent_uploads_are_isolated() {
        let engines = MockEngineFactory::new().page(1, "one").page(2, "two").page(3, "three");
        let harness = Harness::new(engines).await;

        let (a, b) = tokio::join!(
            harness.coordinator.ingest("alice", fake_pdf("a.pdf", 2)),
            harness.coordinator.ingest("bob", fake_pdf("b.pdf", 3)),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_ne!(a.document_id, b.document_id);
        assert_eq!(a.page_count, 2);
        assert_eq!(a.content, "one\n\ntwo");
        assert_eq!(b.page_count, 3);
        assert_eq!(b.content, "one\n\ntwo\n\nthree");

        harness.reaper.flush().await;
        assert!(harness.artifacts().is_empty());
    }

    #[tokio::test]
    async fn test_abandoned_request_finishes_and_reaps() {
        use std::time::Duration;

        let engines = MockEngineFactory::new()
            .page(1, "First")
            .page(2, "Second")
            .slow(Duration::from_millis(300));
        let harness = Harness::new(engines).await;

        // The caller gives up while page 1 is still being recognized
        let abandoned = tokio::time::timeout(
            Duration::from_millis(100),
            harness.coordinator.ingest("alice", fake_pdf("a.pdf", 2)),
        )
        .await;
        assert!(abandoned.is_err());

        let id = only_document(&harness).await;
        let mut cleaned = false;
        for _ in 0..100 {
            harness.reaper.flush().await;
            if text_rows(&harness, &id).await == 1 && harness.artifacts().is_empty() {
                cleaned = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert!(cleaned, "left behind: {:?}", harness.artifacts());
        assert_eq!(harness.engines.recognized(), vec![1, 2]);
        assert_eq!(harness.engines.live_engines(), 0);
    }
}
