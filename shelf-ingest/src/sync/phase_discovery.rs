//! Discovery: search one subject and queue identifiers for hydration
//!
//! Per document:
//! - no identifier → skipped
//! - 13-character identifier preferred over any other length
//! - already queued by this run → skipped (cross-subject dedup)
//! - updated within the freshness window → skipped (never re-fetched)
//! - otherwise queued; a full batch is hydrated immediately

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ensure_active, search_limit, IngestService, Needs, WorkingSet};
use crate::error::SyncError;
use crate::materialize::preferred_identifier;
use crate::models::IngestRun;

impl IngestService {
    pub(super) async fn phase_discovery(
        &self,
        run: &mut IngestRun,
        needs: &Needs,
        subject: &str,
        working: &mut WorkingSet,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        let limit = search_limit(needs.books_remaining(run));

        info!(run_id = %run.run_id, subject = %subject, limit, "Searching subject");

        let docs = self
            .source
            .search(subject, limit, cancel)
            .await
            .map_err(|e| SyncError::search(subject, e))?;

        let mut pending: Vec<String> = Vec::with_capacity(self.settings.batch_size);

        for doc in &docs {
            let Some(isbn) = preferred_identifier(&doc.isbn) else {
                debug!(subject = %subject, work = %doc.key, "Document has no identifier");
                continue;
            };

            if working.is_processed(isbn) {
                debug!(isbn = %isbn, "Already queued by this run");
                continue;
            }

            let updated_at = match self.catalog.book_updated_at(isbn).await {
                Ok(ts) => ts,
                Err(e) => {
                    warn!(isbn = %isbn, error = %e, "Freshness lookup failed, skipping identifier");
                    continue;
                }
            };
            if self.is_fresh(updated_at) {
                debug!(isbn = %isbn, "Fresh in catalog, skipping");
                continue;
            }

            working.mark_processed(isbn);
            run.books_discovered += 1;
            pending.push(isbn.to_string());

            if pending.len() >= self.settings.batch_size {
                ensure_active(cancel)?;
                self.phase_hydration(run, subject, &mut pending, working, cancel)
                    .await?;

                if needs.books_remaining(run) <= 0 {
                    debug!(subject = %subject, "Book target reached, leaving subject");
                    break;
                }
            }
        }

        if !pending.is_empty() {
            ensure_active(cancel)?;
            self.phase_hydration(run, subject, &mut pending, working, cancel)
                .await?;
        }

        Ok(())
    }
}
