//! Artifact Reaper
//!
//! Best-effort deletion of a document's transient files once its run is over.
//!
//! Requests hand document ids to a [`ReaperHandle`]; a dispatcher task drains
//! the bounded queue and runs at most `max_concurrent` deletions at a time.
//! When the queue is full the job is dropped with a warning; the periodic
//! stale sweep reclaims whatever such jobs (or a crash) leave behind.
//!
//! Failures are logged here and never reach a caller.

use std::io;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinHandle;

use super::artifacts::{ArtifactNamer, ArtifactPaths};
use super::pages::scan_page_images;
use super::types::DocumentId;
use crate::config::CleanupConfig;

/// Outcome of one reap or sweep pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapReport {
    pub removed: usize,
    pub failed: usize,
}

enum ReapJob {
    Document(DocumentId),
    Flush(oneshot::Sender<()>),
}

/// Deletes artifacts under one artifact directory
#[derive(Debug, Clone)]
pub struct ArtifactReaper {
    namer: ArtifactNamer,
}

impl ArtifactReaper {
    pub fn new(namer: ArtifactNamer) -> Self {
        Self { namer }
    }

    /// Delete every page image and the source blob of one document
    pub async fn reap(&self, document_id: &DocumentId) -> ReapReport {
        let paths = self.namer.paths(document_id);
        let mut report = ReapReport::default();

        match scan_page_images(&paths).await {
            Ok(pages) => {
                for page in pages {
                    remove_artifact(&page.path, document_id, &mut report).await;
                }
            }
            Err(e) => {
                report.failed += 1;
                tracing::warn!(
                    document_id = %document_id,
                    error = %e,
                    "Error finding page images for cleanup"
                );
            }
        }

        remove_source(&paths, &mut report).await;

        tracing::debug!(
            document_id = %document_id,
            removed = report.removed,
            failed = report.failed,
            "Artifacts reaped"
        );
        report
    }

    /// Delete artifacts of any document whose last modification is at least
    /// `stale_after` old. Files that are not recognizable artifacts are kept.
    pub async fn sweep_stale(&self, stale_after: Duration) -> io::Result<ReapReport> {
        let mut report = ReapReport::default();
        let mut entries = match tokio::fs::read_dir(self.namer.root()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(report),
            Err(e) => return Err(e),
        };
        let now = SystemTime::now();

        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some((document_id, _)) = file_name.to_str().and_then(ArtifactNamer::classify)
            else {
                continue;
            };

            let metadata = match entry.metadata().await {
                Ok(metadata) if metadata.is_file() => metadata,
                Ok(_) => continue,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(path = %entry.path().display(), error = %e, "Failed to stat artifact");
                    continue;
                }
            };

            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();

            if age >= stale_after {
                remove_artifact(&entry.path(), &document_id, &mut report).await;
            }
        }

        Ok(report)
    }

    /// Start the cleanup dispatcher
    pub fn spawn(self: Arc<Self>, config: &CleanupConfig) -> ReaperHandle {
        let max_concurrent = config.max_concurrent.max(1);
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));

        tokio::spawn(run_dispatcher(self, rx, max_concurrent));

        ReaperHandle { tx }
    }

    /// Sweep stale artifacts now and then every `interval`
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration, stale_after: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match self.sweep_stale(stale_after).await {
                    Ok(report) if report.removed > 0 || report.failed > 0 => {
                        tracing::info!(
                            removed = report.removed,
                            failed = report.failed,
                            "Stale artifact sweep finished"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "Stale artifact sweep failed"),
                }
            }
        })
    }
}

/// Cheap, cloneable entry point for scheduling cleanup
#[derive(Debug, Clone)]
pub struct ReaperHandle {
    tx: mpsc::Sender<ReapJob>,
}

impl ReaperHandle {
    /// Queue a document for cleanup without waiting.
    ///
    /// Returns `false` when the job could not be queued.
    pub fn schedule(&self, document_id: DocumentId) -> bool {
        match self.tx.try_send(ReapJob::Document(document_id)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(
                    document_id = %document_id,
                    "Cleanup queue full, leaving artifacts to the stale sweep"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!(
                    document_id = %document_id,
                    "Cleanup dispatcher stopped, leaving artifacts to the stale sweep"
                );
                false
            }
        }
    }

    /// Wait until every job scheduled before this call has finished
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(ReapJob::Flush(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }
}

async fn run_dispatcher(
    reaper: Arc<ArtifactReaper>,
    mut rx: mpsc::Receiver<ReapJob>,
    max_concurrent: usize,
) {
    let permits = Arc::new(Semaphore::new(max_concurrent));
    let all_permits = u32::try_from(max_concurrent).unwrap_or(u32::MAX);

    while let Some(job) = rx.recv().await {
        match job {
            ReapJob::Document(document_id) => {
                let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                    break;
                };
                let reaper = Arc::clone(&reaper);
                tokio::spawn(async move {
                    let _permit = permit;
                    reaper.reap(&document_id).await;
                });
            }
            ReapJob::Flush(done) => {
                // Jobs queued earlier already hold permits; taking them all
                // waits for those deletions to finish.
                if let Ok(_all) = permits.acquire_many(all_permits).await {
                    let _ = done.send(());
                }
            }
        }
    }

    tracing::debug!("Cleanup dispatcher stopped");
}

async fn remove_source(paths: &ArtifactPaths, report: &mut ReapReport) {
    match tokio::fs::remove_file(&paths.source).await {
        Ok(()) => {
            report.removed += 1;
            tracing::debug!(path = %paths.source.display(), "Deleted");
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            report.failed += 1;
            tracing::warn!(
                document_id = %paths.document_id,
                path = %paths.source.display(),
                error = %e,
                "Failed to delete source PDF"
            );
        }
    }
}

async fn remove_artifact(path: &std::path::Path, document_id: &DocumentId, report: &mut ReapReport) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            report.removed += 1;
            tracing::debug!(path = %path.display(), "Deleted");
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            report.failed += 1;
            tracing::warn!(
                document_id = %document_id,
                path = %path.display(),
                error = %e,
                "Failed to delete artifact"
            );
        }
    }
}
