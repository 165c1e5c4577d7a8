//! Author backfill for keys referenced by books written in this run
//!
//! Runs after every subject. Each key is tried at most once per run, so a
//! key skipped as fresh or after a failed fetch is not revisited.

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ensure_active, IngestService, Needs, WorkingSet};
use crate::client::ClientError;
use crate::error::SyncError;
use crate::materialize::materialize_author;
use crate::models::IngestRun;

impl IngestService {
    pub(super) async fn phase_authors(
        &self,
        run: &mut IngestRun,
        needs: &Needs,
        working: &mut WorkingSet,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        if needs.authors_remaining(run) <= 0 || working.pending_author_count() == 0 {
            return Ok(());
        }

        info!(
            run_id = %run.run_id,
            candidates = working.pending_author_count(),
            needed = needs.authors_remaining(run),
            "Backfilling authors"
        );

        while needs.authors_remaining(run) > 0 {
            ensure_active(cancel)?;
            let Some(key) = working.next_author() else {
                break;
            };
            let key = key.as_str();

            match self.catalog.author_updated_at(key).await {
                Ok(updated_at) if self.is_fresh(updated_at) => {
                    debug!(author_key = %key, "Fresh in catalog, skipping");
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(author_key = %key, error = %e, "Freshness lookup failed, skipping author");
                    continue;
                }
            }

            let fetched = match self.source.author_detail(key, cancel).await {
                Ok(fetched) => fetched,
                Err(ClientError::Cancelled) => return Err(SyncError::Cancelled),
                Err(e) => {
                    warn!(author_key = %key, error = %e, "Author fetch failed, skipping author");
                    continue;
                }
            };

            let author = materialize_author(key, &fetched.value, Utc::now());
            if let Err(e) = self.catalog.upsert_author(&author, &fetched.raw).await {
                warn!(author_key = %key, error = %e, "Author upsert failed, skipping author");
                continue;
            }

            self.link_author(run.run_id, key).await;
            run.authors_upserted += 1;
        }

        self.checkpoint(run).await;
        Ok(())
    }
}
