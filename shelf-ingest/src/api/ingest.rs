//! Ingestion run endpoints
//!
//! The trigger only schedules a run and acknowledges it. The outcome is
//! observable through the run ledger (`GET /ingest/runs...`).

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use shelf_common::auth::verify_secret;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::db::runs;
use crate::models::{IngestRun, RunDetail};
use crate::{ApiError, ApiResult, AppState};

/// Header carrying the shared secret on the trigger
pub const SECRET_HEADER: &str = "x-ingest-secret";

const DEFAULT_LIST_LIMIT: i64 = 20;
const MAX_LIST_LIMIT: i64 = 200;

/// Acknowledgement returned by the trigger and the cancel endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct RunAck {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct ListRunsParams {
    pub limit: Option<i64>,
}

/// POST /ingest/runs
///
/// Returns 202 once the run is scheduled, 401 on a bad secret and 409 while
/// another run from this process is still active.
pub async fn start_run(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<(StatusCode, Json<RunAck>)> {
    let presented = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
    verify_secret(presented, &state.shared_secret)
        .map_err(|e| ApiError::Unauthorized(e.to_string()))?;

    let cancel = {
        let mut active = state.active_run.lock().await;
        if active.is_some() {
            return Err(ApiError::Conflict(
                "Ingestion run already active".to_string(),
            ));
        }
        let token = CancellationToken::new();
        *active = Some(token.clone());
        token
    };

    tokio::spawn(run_in_background(state.clone(), cancel));

    Ok((
        StatusCode::ACCEPTED,
        Json(RunAck {
            status: "started".to_string(),
        }),
    ))
}

/// Execute one run, enforcing the run timeout, then release the active slot
///
/// The run itself executes in its own task so that a panic inside it still
/// reaches the cleanup below instead of leaving the slot occupied.
async fn run_in_background(state: AppState, cancel: CancellationToken) {
    let timeout = state.run_timeout;
    let watchdog = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    tracing::warn!(timeout_secs = timeout.as_secs(), "Ingestion run timed out, cancelling");
                    cancel.cancel();
                }
            }
        })
    };

    let run = {
        let service = state.service.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { service.run(&cancel).await })
    };

    match run.await {
        Ok(Ok(run)) => {
            tracing::info!(run_id = %run.run_id, status = %run.status, "Background ingestion run finished");
        }
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Background ingestion run failed");
            *state.last_error.write().await = Some(e.to_string());
        }
        Err(e) => {
            let message = if e.is_panic() {
                "run task panicked".to_string()
            } else {
                format!("run task aborted: {}", e)
            };
            tracing::error!(error = %e, "{}", message);
            *state.last_error.write().await = Some(message);
        }
    }

    watchdog.abort();
    *state.active_run.lock().await = None;
}

/// POST /ingest/runs/active/cancel
pub async fn cancel_active_run(State(state): State<AppState>) -> ApiResult<(StatusCode, Json<RunAck>)> {
    let active = state.active_run.lock().await;
    let token = active
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("No active ingestion run".to_string()))?;

    token.cancel();
    tracing::info!("Cancellation requested for active ingestion run");

    Ok((
        StatusCode::ACCEPTED,
        Json(RunAck {
            status: "cancelling".to_string(),
        }),
    ))
}

/// GET /ingest/runs?limit=N
pub async fn list_runs(
    State(state): State<AppState>,
    Query(params): Query<ListRunsParams>,
) -> ApiResult<Json<Vec<IngestRun>>> {
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    if limit < 1 {
        return Err(ApiError::BadRequest(format!(
            "limit must be at least 1, got {}",
            limit
        )));
    }

    let runs = runs::list_runs(&state.db, limit.min(MAX_LIST_LIMIT)).await?;
    Ok(Json(runs))
}

/// GET /ingest/runs/:run_id
pub async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> ApiResult<Json<RunDetail>> {
    let detail = runs::load_run_detail(&state.db, run_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Run {} not found", run_id)))?;

    Ok(Json(detail))
}

/// Build ingestion routes
pub fn ingest_routes() -> Router<AppState> {
    Router::new()
        .route("/ingest/runs", post(start_run).get(list_runs))
        .route("/ingest/runs/active/cancel", post(cancel_active_run))
        .route("/ingest/runs/:run_id", get(get_run))
}
