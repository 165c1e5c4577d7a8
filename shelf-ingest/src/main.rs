//! shelf-ingest - catalog ingestion service
//!
//! Populates the local book/author catalog from the Open Library API on
//! demand (`POST /ingest/runs`) and records every run in the ledger.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use shelf_ingest::client::OpenLibraryClient;
use shelf_ingest::config::{ServiceConfig, DB_FILE_NAME};
use shelf_ingest::db::{self, SqliteCatalogStore, SqliteRunLedger};
use shelf_ingest::sync::IngestService;
use shelf_ingest::AppState;

/// How long shutdown waits for an active run to finalize
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Command-line arguments for shelf-ingest
#[derive(Parser, Debug)]
#[command(name = "shelf-ingest")]
#[command(about = "Catalog ingestion service")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root folder holding the database
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Database file (defaults to <root>/shelf.db)
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "SHELF_INGEST_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = ServiceConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting shelf-ingest (catalog ingestion)");
    info!(
        "Version: {} (git {}, built {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );

    // Root folder and database
    let root_folder = shelf_common::config::resolve_root_folder(
        args.root_folder.as_deref(),
        config.root_folder.as_deref(),
    );
    let default_db = shelf_common::config::prepare_root_folder(&root_folder, DB_FILE_NAME)
        .context("Failed to initialize root folder")?;
    let db_path = args
        .database
        .or_else(|| config.database_path.clone())
        .unwrap_or(default_db);
    info!("Root folder: {}", root_folder.display());
    info!("Database: {}", db_path.display());

    let pool = db::init_database_pool(&db_path)
        .await
        .context("Failed to open database")?;

    let interrupted = db::runs::fail_stale_runs(&pool).await?;
    if interrupted > 0 {
        info!("Recovered {} interrupted run(s)", interrupted);
    }

    let shared_secret = match config.ingest_secret.clone() {
        Some(secret) => secret,
        None => shelf_common::auth::load_or_init_shared_secret(&pool)
            .await
            .context("Failed to load shared secret")?,
    };

    // Ingestion core
    let client = OpenLibraryClient::new(&config.api).context("Failed to build API client")?;
    info!(
        base_url = client.base_url(),
        requests_per_second = config.api.requests_per_second,
        max_retries = config.api.max_retries,
        "Open Library client ready"
    );

    let service = IngestService::new(
        Arc::new(client),
        Arc::new(SqliteCatalogStore::new(pool.clone())),
        Arc::new(SqliteRunLedger::new(pool.clone())),
        config.sync.clone(),
    );

    let state = AppState::new(pool, Arc::new(service), shared_secret);
    let app = shelf_ingest::build_router(state.clone());

    let port = args.port.unwrap_or(config.port);
    let host: std::net::IpAddr = config
        .host
        .parse()
        .with_context(|| format!("Invalid host address: {}", config.host))?;
    let addr = SocketAddr::new(host, port);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await
        .context("Server error")?;

    if !state.drain_active_run(SHUTDOWN_GRACE).await {
        warn!(
            grace_secs = SHUTDOWN_GRACE.as_secs(),
            "Ingestion run did not finish before shutdown; it will be marked interrupted on next start"
        );
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM, then cancel any active run
async fn shutdown_signal(state: AppState) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }

    if let Some(token) = state.active_run.lock().await.as_ref() {
        info!("Cancelling active ingestion run");
        token.cancel();
    }
}
