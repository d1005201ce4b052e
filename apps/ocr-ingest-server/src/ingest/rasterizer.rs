//! PDF rasterization
//!
//! Converts a stored PDF into numbered page images by running an external
//! tool. The default implementation drives `pdftoppm`, which writes
//! `<prefix>-<N>.png` for every page.
//!
//! Conversion runs under its own deadline. The child process is killed when
//! the deadline expires or when the caller stops waiting (the request future
//! is dropped), so a hostile PDF cannot pin a worker.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::task::JoinHandle;

use super::types::IngestError;
use crate::config::RasterizerConfig;

const STDERR_GRACE: Duration = Duration::from_secs(2);

/// PDF -> page image conversion
#[async_trait]
pub trait Rasterizer: Send + Sync {
    /// Render every page of `source` to files starting with `page_prefix`.
    ///
    /// Produces files as a side effect; callers enumerate them separately.
    async fn rasterize(&self, source: &Path, page_prefix: &Path) -> Result<(), IngestError>;
}

/// `pdftoppm`-compatible command line rasterizer
#[derive(Debug, Clone)]
pub struct PdftoppmRasterizer {
    program: PathBuf,
    dpi: u32,
    timeout: Duration,
}

impl PdftoppmRasterizer {
    pub fn new(program: impl Into<PathBuf>, dpi: u32, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            dpi,
            timeout,
        }
    }

    pub fn from_config(config: &RasterizerConfig) -> Self {
        Self::new(&config.program, config.dpi, config.timeout)
    }
}

#[async_trait]
impl Rasterizer for PdftoppmRasterizer {
    async fn rasterize(&self, source: &Path, page_prefix: &Path) -> Result<(), IngestError> {
        if tokio::fs::metadata(source).await.is_err() {
            return Err(IngestError::SourceNotFound(source.to_path_buf()));
        }

        let mut cmd = Command::new(&self.program);
        cmd.arg("-png")
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg(source)
            .arg(page_prefix)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| IngestError::ConversionFailed {
            reason: format!("failed to start {}: {}", self.program.display(), e),
            stderr: String::new(),
        })?;

        // Drained on its own task so the output survives a killed process
        let stderr = child.stderr.take().map(|mut pipe| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf).await;
                buf
            })
        });

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                return Err(IngestError::ConversionFailed {
                    reason: format!("failed to wait for {}: {}", self.program.display(), e),
                    stderr: collect_stderr(stderr).await,
                })
            }
            Err(_) => {
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "Failed to kill rasterizer");
                }
                tracing::warn!(
                    source = %source.display(),
                    timeout_secs = self.timeout.as_secs_f64(),
                    "Rasterizer deadline exceeded, process killed"
                );
                return Err(IngestError::ConversionFailed {
                    reason: format!("timed out after {:?}", self.timeout),
                    stderr: collect_stderr(stderr).await,
                });
            }
        };

        if !status.success() {
            return Err(IngestError::ConversionFailed {
                reason: status.to_string(),
                stderr: collect_stderr(stderr).await,
            });
        }

        Ok(())
    }
}

/// Whatever the tool wrote to stderr, trimmed.
///
/// A grandchild still holding the pipe open would block the read forever, so
/// collection gives up after a short grace period.
async fn collect_stderr(task: Option<JoinHandle<Vec<u8>>>) -> String {
    let Some(task) = task else {
        return String::new();
    };

    match tokio::time::timeout(STDERR_GRACE, task).await {
        Ok(Ok(buf)) => String::from_utf8_lossy(&buf).trim().to_string(),
        _ => String::new(),
    }
}
