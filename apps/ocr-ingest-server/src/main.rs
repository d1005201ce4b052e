//! OCR Ingest Server
//!
//! Turns uploaded PDFs into searchable text: rasterize, recognize, persist.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ocr_ingest_server::config::Config;
use ocr_ingest_server::db::{self, SqliteDocumentStore};
use ocr_ingest_server::ingest::{
    ArtifactNamer, ArtifactReaper, IngestCoordinator, PdftoppmRasterizer,
};
use ocr_ingest_server::ocr::{engine_factory, OcrSettings};
use ocr_ingest_server::routes;
use ocr_ingest_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "ocr_ingest_server=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("Invalid configuration")?;

    tracing::info!("Starting OCR Ingest Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Artifact directory: {}", config.artifacts.dir.display());
    tracing::info!(
        "Rasterizer: {} at {} dpi, OCR backend: {:?} ({}, psm {})",
        config.rasterizer.program,
        config.rasterizer.dpi,
        config.ocr.backend,
        config.ocr.language,
        config.ocr.page_seg_mode
    );

    // Initialize database
    let db_pool = db::create_pool(&config.database.url)
        .await
        .context("Failed to initialize database")?;
    tracing::info!("Database initialized at {}", config.database.url);

    tokio::fs::create_dir_all(&config.artifacts.dir)
        .await
        .with_context(|| format!("Failed to create {}", config.artifacts.dir.display()))?;

    // Artifact cleanup: per-run reaping plus the periodic stale sweep
    let namer = ArtifactNamer::new(&config.artifacts.dir);
    let reaper = Arc::new(ArtifactReaper::new(namer.clone()));
    let reaper_handle = reaper.clone().spawn(&config.cleanup);
    let sweeper = reaper.spawn_sweeper(config.cleanup.sweep_interval, config.cleanup.stale_after);

    let engines = engine_factory(&config.ocr).context("Failed to set up OCR backend")?;
    let coordinator = IngestCoordinator::new(
        namer,
        Arc::new(PdftoppmRasterizer::from_config(&config.rasterizer)),
        engines,
        OcrSettings::from(&config.ocr),
        Arc::new(SqliteDocumentStore::new(db_pool)),
        reaper_handle.clone(),
    );

    let app_state = AppState::new(config.clone(), coordinator, reaper_handle);
    let app = routes::app(app_state.clone());

    // Start server with graceful shutdown
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    tracing::info!("OCR Ingest Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    sweeper.abort();
    app_state.shutdown().await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
