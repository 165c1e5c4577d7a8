//! Sync controller
//!
//! Drives one ingestion run end to end:
//! 1. Create the run (RUNNING) in the ledger
//! 2. Read catalog totals; stop early when both targets are already met
//! 3. Discovery: search each subject in order, filter identifiers, batch them
//! 4. Hydration: fetch batches, materialize, upsert, link
//! 5. Author backfill for keys referenced by written books, after every
//!    subject; the next subject is searched only while a need remains
//! 6. Finalize the run (COMPLETED or FAILED) exactly once
//!
//! Failure handling:
//! - Run creation, catalog counts and subject search failures end the run
//! - Hydration, book upsert, author fetch and author upsert failures skip
//!   the item and the run continues
//! - Link writes are best effort and never change the run outcome
//!
//! Runs are strictly sequential: no batch or subject is processed
//! concurrently with another.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::client::BookSource;
use crate::config::SyncSettings;
use crate::error::SyncError;
use crate::models::IngestRun;
use crate::store::{CatalogStore, RunLedger};

mod phase_authors;
mod phase_discovery;
mod phase_hydration;
mod working_set;

pub use working_set::WorkingSet;

/// Largest search page requested from the provider
const MAX_SEARCH_PAGE: i64 = 100;

/// What the run still has to add, measured at run start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Needs {
    pub books: i64,
    pub authors: i64,
}

impl Needs {
    pub fn new(settings: &SyncSettings, current_books: i64, current_authors: i64) -> Self {
        Self {
            books: settings.target_books - current_books,
            authors: settings.target_authors - current_authors,
        }
    }

    /// Books still missing after what this run has written
    pub fn books_remaining(&self, run: &IngestRun) -> i64 {
        self.books - run.books_upserted
    }

    /// Authors still missing after what this run has written
    pub fn authors_remaining(&self, run: &IngestRun) -> i64 {
        self.authors - run.authors_upserted
    }

    /// Both targets are covered by what this run has written
    pub fn satisfied(&self, run: &IngestRun) -> bool {
        self.books_remaining(run) <= 0 && self.authors_remaining(run) <= 0
    }
}

/// Search page size: twice the remaining need (capped at 100) to make up for
/// documents without identifiers; 100 when no positive need is known.
pub fn search_limit(books_remaining: i64) -> usize {
    if books_remaining > 0 {
        (books_remaining.min(MAX_SEARCH_PAGE) * 2) as usize
    } else {
        MAX_SEARCH_PAGE as usize
    }
}

/// Orchestrates ingestion runs against a provider, catalog and ledger
pub struct IngestService {
    source: Arc<dyn BookSource>,
    catalog: Arc<dyn CatalogStore>,
    ledger: Arc<dyn RunLedger>,
    settings: SyncSettings,
}

impl IngestService {
    pub fn new(
        source: Arc<dyn BookSource>,
        catalog: Arc<dyn CatalogStore>,
        ledger: Arc<dyn RunLedger>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            source,
            catalog,
            ledger,
            settings,
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Execute one run.
    ///
    /// Once the run record exists it is always finalized, whichever way
    /// `execute` returns. On success the final record is returned.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<IngestRun, SyncError> {
        let snapshot = self.settings.snapshot();
        let run_id = self.ledger.create_run(&snapshot).await.map_err(|e| {
            error!(error = %e, "Failed to create run record");
            SyncError::CreateRun(e.to_string())
        })?;

        let mut run = IngestRun::new(run_id, snapshot, Utc::now());
        info!(
            run_id = %run_id,
            target_books = run.config.target_books,
            target_authors = run.config.target_authors,
            subjects = run.config.subjects.len(),
            "Ingestion run started"
        );

        let result = self.execute(&mut run, cancel).await;
        self.finalize(&mut run, result.as_ref().err()).await;

        result.map(|()| run)
    }

    async fn execute(&self, run: &mut IngestRun, cancel: &CancellationToken) -> Result<(), SyncError> {
        let current_books = self
            .catalog
            .total_books()
            .await
            .map_err(|e| SyncError::Counts(e.to_string()))?;
        let current_authors = self
            .catalog
            .total_authors()
            .await
            .map_err(|e| SyncError::Counts(e.to_string()))?;

        let needs = Needs::new(&self.settings, current_books, current_authors);
        if needs.books <= 0 && needs.authors <= 0 {
            info!(
                run_id = %run.run_id,
                current_books,
                current_authors,
                "Catalog already meets targets, nothing to do"
            );
            return Ok(());
        }

        info!(
            run_id = %run.run_id,
            needed_books = needs.books,
            needed_authors = needs.authors,
            "Catalog below targets"
        );

        let mut working = WorkingSet::default();

        for subject in &self.settings.subjects {
            if needs.satisfied(run) {
                break;
            }
            ensure_active(cancel)?;
            self.phase_discovery(run, &needs, subject, &mut working, cancel)
                .await?;
            self.phase_authors(run, &needs, &mut working, cancel).await?;
        }

        Ok(())
    }

    /// Stamp the terminal status and persist it
    async fn finalize(&self, run: &mut IngestRun, error: Option<&SyncError>) {
        if !run.finish(error.map(|e| e.to_string()), Utc::now()) {
            return;
        }

        match error {
            Some(err) => error!(run_id = %run.run_id, error = %err, "Ingestion run failed"),
            None => info!(
                run_id = %run.run_id,
                books_discovered = run.books_discovered,
                books_upserted = run.books_upserted,
                authors_discovered = run.authors_discovered,
                authors_upserted = run.authors_upserted,
                "Ingestion run completed"
            ),
        }

        if let Err(e) = self.ledger.update_run(run).await {
            error!(run_id = %run.run_id, error = %e, "Failed to persist final run state");
        }
    }

    /// Persist running counters mid-run (best effort)
    async fn checkpoint(&self, run: &IngestRun) {
        if let Err(e) = self.ledger.update_run(run).await {
            warn!(run_id = %run.run_id, error = %e, "Failed to checkpoint run progress");
        }
    }

    async fn link_book(&self, run_id: Uuid, isbn: &str) {
        if let Err(e) = self.ledger.link_book(run_id, isbn).await {
            warn!(run_id = %run_id, isbn = %isbn, error = %e, "Failed to link book to run");
        }
    }

    async fn link_author(&self, run_id: Uuid, author_key: &str) {
        if let Err(e) = self.ledger.link_author(run_id, author_key).await {
            warn!(run_id = %run_id, author_key = %author_key, error = %e, "Failed to link author to run");
        }
    }

    fn is_fresh(&self, updated_at: Option<DateTime<Utc>>) -> bool {
        shelf_common::time::is_fresh(updated_at, self.settings.freshness_window(), Utc::now())
    }
}

fn ensure_active(cancel: &CancellationToken) -> Result<(), SyncError> {
    if cancel.is_cancelled() {
        Err(SyncError::Cancelled)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RunConfigSnapshot;

    fn run() -> IngestRun {
        IngestRun::new(
            Uuid::new_v4(),
            RunConfigSnapshot {
                target_books: 0,
                target_authors: 0,
                subjects: vec![],
            },
            Utc::now(),
        )
    }

    #[test]
    fn test_search_limit() {
        assert_eq!(search_limit(0), 100);
        assert_eq!(search_limit(-5), 100);
        assert_eq!(search_limit(1), 2);
        assert_eq!(search_limit(30), 60);
        assert_eq!(search_limit(100), 200);
        assert_eq!(search_limit(5000), 200);
    }

    #[test]
    fn test_needs_from_targets() {
        let settings = SyncSettings {
            target_books: 10,
            target_authors: 4,
            ..SyncSettings::default()
        };
        let needs = Needs::new(&settings, 3, 6);
        assert_eq!(needs, Needs { books: 7, authors: -2 });
    }

    #[test]
    fn test_remaining_uses_run_counters() {
        let needs = Needs { books: 5, authors: 3 };
        let mut run = run();
        run.books_upserted = 2;
        run.authors_upserted = 3;
        assert_eq!(needs.books_remaining(&run), 3);
        assert_eq!(needs.authors_remaining(&run), 0);
    }

    #[test]
    fn test_satisfied_needs_written_authors_not_queued_keys() {
        let needs = Needs { books: 1, authors: 2 };
        let mut run = run();
        assert!(!needs.satisfied(&run));

        run.books_upserted = 1;
        run.authors_discovered = 5;
        assert!(!needs.satisfied(&run));

        run.authors_upserted = 2;
        assert!(needs.satisfied(&run));
    }
}
