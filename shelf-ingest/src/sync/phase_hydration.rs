//! Hydration: fetch a batch of details and write catalog rows
//!
//! A failed batch request or a failed write for one book is logged and
//! skipped. Only cancellation ends the run from here.

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{IngestService, WorkingSet};
use crate::client::ClientError;
use crate::error::SyncError;
use crate::materialize::materialize_book;
use crate::models::IngestRun;

impl IngestService {
    /// Hydrate and drain `pending`
    pub(super) async fn phase_hydration(
        &self,
        run: &mut IngestRun,
        subject: &str,
        pending: &mut Vec<String>,
        working: &mut WorkingSet,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        let batch = std::mem::take(pending);

        let details = match self.source.hydrate(&batch, cancel).await {
            Ok(details) => details,
            Err(ClientError::Cancelled) => return Err(SyncError::Cancelled),
            Err(e) => {
                warn!(
                    run_id = %run.run_id,
                    batch_size = batch.len(),
                    error = %e,
                    "Hydration batch failed, skipping batch"
                );
                return Ok(());
            }
        };

        let now = Utc::now();
        let mut written = 0usize;

        for isbn in &batch {
            let Some(fetched) = details.get(isbn) else {
                debug!(isbn = %isbn, "Provider has no data for identifier");
                continue;
            };

            let materialized = materialize_book(isbn, &fetched.value, Some(subject), now);

            if let Err(e) = self.catalog.upsert_book(&materialized.book, &fetched.raw).await {
                warn!(isbn = %isbn, error = %e, "Book upsert failed, skipping book");
                continue;
            }
            if let Err(e) = self.catalog.upsert_serving_book(&materialized.serving).await {
                warn!(isbn = %isbn, error = %e, "Serving row upsert failed, skipping book");
                continue;
            }

            self.link_book(run.run_id, isbn).await;
            run.books_upserted += 1;
            written += 1;

            for key in &materialized.author_keys {
                if working.add_author(key) {
                    run.authors_discovered += 1;
                }
            }
        }

        info!(
            run_id = %run.run_id,
            subject = %subject,
            requested = batch.len(),
            returned = details.len(),
            written,
            "Hydrated batch"
        );

        self.checkpoint(run).await;
        Ok(())
    }
}
