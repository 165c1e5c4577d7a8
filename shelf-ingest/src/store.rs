//! Persistence seams used by the sync controller
//!
//! The SQLite implementations live in `crate::db`; tests substitute
//! in-memory fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shelf_common::Result;
use uuid::Uuid;

use crate::models::{CatalogAuthor, CatalogBook, IngestRun, RunConfigSnapshot, ServingBook};

/// Catalog of books and authors plus their provenance
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Insert or overwrite a book together with its raw provider JSON
    async fn upsert_book(&self, book: &CatalogBook, raw: &serde_json::Value) -> Result<()>;

    /// Insert or overwrite the denormalized serving row
    async fn upsert_serving_book(&self, book: &ServingBook) -> Result<()>;

    /// Insert or overwrite an author together with its raw provider JSON
    async fn upsert_author(&self, author: &CatalogAuthor, raw: &serde_json::Value) -> Result<()>;

    async fn total_books(&self) -> Result<i64>;

    async fn total_authors(&self) -> Result<i64>;

    /// `None` when the book has never been ingested
    async fn book_updated_at(&self, isbn: &str) -> Result<Option<DateTime<Utc>>>;

    /// `None` when the author has never been ingested
    async fn author_updated_at(&self, author_key: &str) -> Result<Option<DateTime<Utc>>>;
}

/// Audit ledger of ingestion runs
#[async_trait]
pub trait RunLedger: Send + Sync {
    /// Record a new RUNNING run and return its id
    async fn create_run(&self, config: &RunConfigSnapshot) -> Result<Uuid>;

    /// Persist status, finish time, counters and error of a run
    async fn update_run(&self, run: &IngestRun) -> Result<()>;

    /// Idempotent: linking the same pair twice is a no-op
    async fn link_book(&self, run_id: Uuid, isbn: &str) -> Result<()>;

    /// Idempotent: linking the same pair twice is a no-op
    async fn link_author(&self, run_id: Uuid, author_key: &str) -> Result<()>;
}
