//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::ingest::{IngestCoordinator, ReaperHandle};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    coordinator: IngestCoordinator,
    reaper: ReaperHandle,
}

impl AppState {
    /// Create a new application state
    pub fn new(config: Config, coordinator: IngestCoordinator, reaper: ReaperHandle) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                coordinator,
                reaper,
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the ingestion pipeline
    pub fn coordinator(&self) -> &IngestCoordinator {
        &self.inner.coordinator
    }

    /// Wait for queued artifact cleanup to finish
    pub async fn shutdown(&self) {
        tracing::info!("Draining artifact cleanup queue...");
        self.inner.reaper.flush().await;
    }
}
