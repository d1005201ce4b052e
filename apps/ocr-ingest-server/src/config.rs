//! Configuration management for the OCR ingest server

use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while reading configuration from the environment
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Invalid OCR language code: {0}")]
    InvalidLanguage(String),

    #[error("Page segmentation mode must be between 0 and 13, got {0}")]
    InvalidPageSegMode(u8),

    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub artifacts: ArtifactConfig,
    pub rasterizer: RasterizerConfig,
    pub ocr: OcrConfig,
    pub cleanup: CleanupConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Where transient upload artifacts live
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactConfig {
    pub dir: PathBuf,
    /// Upper bound for a single multipart request body
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RasterizerConfig {
    /// Executable name or path (pdftoppm-compatible)
    pub program: String,
    pub dpi: u32,
    /// Hard ceiling for one conversion, independent of the request
    pub timeout: Duration,
}

/// Which recognition engine implementation to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrBackend {
    /// `tesseract` command line, one process per page
    Cli,
    /// Native libtesseract handle (requires the `ocr-tesseract` feature)
    Library,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OcrConfig {
    pub backend: OcrBackend,
    pub program: String,
    pub language: String,
    pub page_seg_mode: u8,
    pub page_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CleanupConfig {
    pub max_concurrent: usize,
    pub queue_capacity: usize,
    pub sweep_interval: Duration,
    pub stale_after: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Header carrying the caller identity established by the upstream auth layer
    pub identity_header: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "sqlite:./ocr-ingest.db".to_string(),
            },
            artifacts: ArtifactConfig {
                dir: PathBuf::from("uploads"),
                max_upload_bytes: 100 * 1024 * 1024,
            },
            rasterizer: RasterizerConfig {
                program: "pdftoppm".to_string(),
                dpi: 300,
                timeout: Duration::from_secs(5 * 60),
            },
            ocr: OcrConfig {
                backend: OcrBackend::Cli,
                program: "tesseract".to_string(),
                language: "eng".to_string(),
                page_seg_mode: 3,
                page_timeout: None,
            },
            cleanup: CleanupConfig {
                max_concurrent: 4,
                queue_capacity: 256,
                sweep_interval: Duration::from_secs(60 * 60),
                stale_after: Duration::from_secs(24 * 60 * 60),
            },
            auth: AuthConfig {
                identity_header: "x-authenticated-user".to_string(),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let backend = match env::var("OCR_BACKEND").ok().as_deref() {
            None | Some("cli") => OcrBackend::Cli,
            Some("library") => OcrBackend::Library,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "OCR_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        let config = Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse_var("SERVER_PORT", defaults.server.port)?,
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or(defaults.database.url),
            },
            artifacts: ArtifactConfig {
                dir: env::var("ARTIFACT_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.artifacts.dir),
                max_upload_bytes: parse_var("MAX_UPLOAD_BYTES", defaults.artifacts.max_upload_bytes)?,
            },
            rasterizer: RasterizerConfig {
                program: env::var("RASTERIZER_PROGRAM").unwrap_or(defaults.rasterizer.program),
                dpi: parse_var("RASTERIZER_DPI", defaults.rasterizer.dpi)?,
                timeout: Duration::from_secs(parse_var(
                    "RASTERIZER_TIMEOUT_SECS",
                    defaults.rasterizer.timeout.as_secs(),
                )?),
            },
            ocr: OcrConfig {
                backend,
                program: env::var("OCR_PROGRAM").unwrap_or(defaults.ocr.program),
                language: env::var("OCR_LANGUAGE").unwrap_or(defaults.ocr.language),
                page_seg_mode: parse_var("OCR_PAGE_SEG_MODE", defaults.ocr.page_seg_mode)?,
                page_timeout: parse_optional_var::<u64>("OCR_PAGE_TIMEOUT_SECS")?
                    .map(Duration::from_secs),
            },
            cleanup: CleanupConfig {
                max_concurrent: parse_var("CLEANUP_MAX_CONCURRENT", defaults.cleanup.max_concurrent)?,
                queue_capacity: parse_var("CLEANUP_QUEUE_CAPACITY", defaults.cleanup.queue_capacity)?,
                sweep_interval: Duration::from_secs(parse_var(
                    "CLEANUP_SWEEP_INTERVAL_SECS",
                    defaults.cleanup.sweep_interval.as_secs(),
                )?),
                stale_after: Duration::from_secs(parse_var(
                    "CLEANUP_STALE_AFTER_SECS",
                    defaults.cleanup.stale_after.as_secs(),
                )?),
            },
            auth: AuthConfig {
                identity_header: env::var("AUTH_IDENTITY_HEADER")
                    .map(|h| h.to_ascii_lowercase())
                    .unwrap_or(defaults.auth.identity_header),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would misbehave at request time
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_language(&self.ocr.language)?;

        if self.ocr.page_seg_mode > 13 {
            return Err(ConfigError::InvalidPageSegMode(self.ocr.page_seg_mode));
        }
        if self.rasterizer.timeout.is_zero() {
            return Err(ConfigError::ZeroValue("RASTERIZER_TIMEOUT_SECS"));
        }
        if self.cleanup.max_concurrent == 0 {
            return Err(ConfigError::ZeroValue("CLEANUP_MAX_CONCURRENT"));
        }
        if self.cleanup.queue_capacity == 0 {
            return Err(ConfigError::ZeroValue("CLEANUP_QUEUE_CAPACITY"));
        }
        if self.cleanup.sweep_interval.is_zero() {
            return Err(ConfigError::ZeroValue("CLEANUP_SWEEP_INTERVAL_SECS"));
        }

        Ok(())
    }
}

/// Language codes end up as process arguments, so only allow
/// alphanumerics with `_` and `+` (e.g. "eng", "eng+deu", "chi_sim").
pub fn validate_language(lang: &str) -> Result<(), ConfigError> {
    if lang.is_empty() || lang.len() > 20 {
        return Err(ConfigError::InvalidLanguage(lang.to_string()));
    }
    if !lang
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '_')
    {
        return Err(ConfigError::InvalidLanguage(lang.to_string()));
    }
    Ok(())
}

fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    Ok(parse_optional_var(key)?.unwrap_or(default))
}

fn parse_optional_var<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
        Err(_) => Ok(None),
    }
}
