//! shelf-ingest library interface
//!
//! Exposes the ingestion core and HTTP boundary for the binary and for
//! integration tests.

pub mod api;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod materialize;
pub mod models;
pub mod store;
pub mod sync;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::sync::IngestService;

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool (run status queries)
    pub db: SqlitePool,
    /// Sync controller invoked by the trigger
    pub service: Arc<IngestService>,
    /// Expected value of the `x-ingest-secret` header
    pub shared_secret: Arc<String>,
    /// Upper bound on a single run's wall-clock time
    pub run_timeout: Duration,
    /// Cancellation token of the run launched by this process, if any
    pub active_run: Arc<Mutex<Option<CancellationToken>>>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Most recent fatal run error
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(db: SqlitePool, service: Arc<IngestService>, shared_secret: String) -> Self {
        let run_timeout = service.settings().run_timeout();
        Self {
            db,
            service,
            shared_secret: Arc::new(shared_secret),
            run_timeout,
            active_run: Arc::new(Mutex::new(None)),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// True while a run started by this process has not finished
    pub async fn run_active(&self) -> bool {
        self.active_run.lock().await.is_some()
    }

    /// Cancel the active run, if any, and wait up to `grace` for it to write
    /// its final ledger state.
    ///
    /// Returns false if the run was still active when `grace` ran out.
    pub async fn drain_active_run(&self, grace: Duration) -> bool {
        if let Some(token) = self.active_run.lock().await.as_ref() {
            token.cancel();
        }

        tokio::time::timeout(grace, async {
            while self.run_active().await {
                tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
            }
        })
        .await
        .is_ok()
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::ingest_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
