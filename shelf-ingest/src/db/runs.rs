//! Run ledger persistence
//!
//! One `ingest_runs` row per run, plus link tables naming every book and
//! author the run wrote.

use async_trait::async_trait;
use shelf_common::time::{now, parse_db_string, to_db_string};
use shelf_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::{IngestRun, RunConfigSnapshot, RunDetail, RunStatus};
use crate::store::RunLedger;

/// Error text recorded on runs found RUNNING at startup
pub const INTERRUPTED_ERROR: &str = "interrupted: service restarted";

const RUN_COLUMNS: &str = r#"
    run_id, status, started_at, finished_at, target_books, target_authors,
    subjects, books_discovered, books_upserted, authors_discovered,
    authors_upserted, error
"#;

#[derive(Clone)]
pub struct SqliteRunLedger {
    pool: SqlitePool,
}

impl SqliteRunLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl RunLedger for SqliteRunLedger {
    async fn create_run(&self, config: &RunConfigSnapshot) -> Result<Uuid> {
        let run_id = Uuid::new_v4();
        let subjects = serde_json::to_string(&config.subjects)?;

        sqlx::query(
            r#"
            INSERT INTO ingest_runs (
                run_id, status, started_at, target_books, target_authors, subjects
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(run_id.to_string())
        .bind(RunStatus::Running.as_str())
        .bind(to_db_string(now()))
        .bind(config.target_books)
        .bind(config.target_authors)
        .bind(subjects)
        .execute(&self.pool)
        .await?;

        Ok(run_id)
    }

    async fn update_run(&self, run: &IngestRun) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE ingest_runs SET
                status = ?,
                finished_at = ?,
                books_discovered = ?,
                books_upserted = ?,
                authors_discovered = ?,
                authors_upserted = ?,
                error = ?
            WHERE run_id = ?
            "#,
        )
        .bind(run.status.as_str())
        .bind(run.finished_at.map(to_db_string))
        .bind(run.books_discovered)
        .bind(run.books_upserted)
        .bind(run.authors_discovered)
        .bind(run.authors_upserted)
        .bind(&run.error)
        .bind(run.run_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Run {} not found", run.run_id)));
        }

        Ok(())
    }

    async fn link_book(&self, run_id: Uuid, isbn: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO ingest_run_books (run_id, isbn) VALUES (?, ?)")
            .bind(run_id.to_string())
            .bind(isbn)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn link_author(&self, run_id: Uuid, author_key: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO ingest_run_authors (run_id, author_key) VALUES (?, ?)")
            .bind(run_id.to_string())
            .bind(author_key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn run_from_row(row: &SqliteRow) -> Result<IngestRun> {
    let run_id: String = row.get("run_id");
    let run_id = Uuid::parse_str(&run_id)
        .map_err(|e| Error::Internal(format!("Failed to parse run_id: {}", e)))?;

    let status: String = row.get("status");
    let status = RunStatus::parse(&status)
        .ok_or_else(|| Error::Internal(format!("Unknown run status '{}'", status)))?;

    let subjects: String = row.get("subjects");
    let subjects: Vec<String> = serde_json::from_str(&subjects)?;

    let started_at: String = row.get("started_at");
    let finished_at: Option<String> = row.get("finished_at");

    Ok(IngestRun {
        run_id,
        status,
        config: RunConfigSnapshot {
            target_books: row.get("target_books"),
            target_authors: row.get("target_authors"),
            subjects,
        },
        started_at: parse_db_string(&started_at)?,
        finished_at: finished_at.as_deref().map(parse_db_string).transpose()?,
        books_discovered: row.get("books_discovered"),
        books_upserted: row.get("books_upserted"),
        authors_discovered: row.get("authors_discovered"),
        authors_upserted: row.get("authors_upserted"),
        error: row.get("error"),
    })
}

/// Load a single run
pub async fn load_run(pool: &SqlitePool, run_id: Uuid) -> Result<Option<IngestRun>> {
    let row = sqlx::query(&format!("SELECT {} FROM ingest_runs WHERE run_id = ?", RUN_COLUMNS))
        .bind(run_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(run_from_row).transpose()
}

/// Most recent runs first
pub async fn list_runs(pool: &SqlitePool, limit: i64) -> Result<Vec<IngestRun>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM ingest_runs ORDER BY started_at DESC, rowid DESC LIMIT ?",
        RUN_COLUMNS
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(run_from_row).collect()
}

/// Run plus link counts, `None` if the run does not exist
pub async fn load_run_detail(pool: &SqlitePool, run_id: Uuid) -> Result<Option<RunDetail>> {
    let Some(run) = load_run(pool, run_id).await? else {
        return Ok(None);
    };

    let id = run_id.to_string();
    let linked_books: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ingest_run_books WHERE run_id = ?")
        .bind(&id)
        .fetch_one(pool)
        .await?;
    let linked_authors: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM ingest_run_authors WHERE run_id = ?")
            .bind(&id)
            .fetch_one(pool)
            .await?;

    Ok(Some(RunDetail {
        run,
        linked_books,
        linked_authors,
    }))
}

/// Mark runs left RUNNING by a previous process as FAILED.
///
/// Returns the number of runs updated.
pub async fn fail_stale_runs(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE ingest_runs
        SET status = ?, finished_at = ?, error = ?
        WHERE status = ?
        "#,
    )
    .bind(RunStatus::Failed.as_str())
    .bind(to_db_string(now()))
    .bind(INTERRUPTED_ERROR)
    .bind(RunStatus::Running.as_str())
    .execute(pool)
    .await?;

    let count = result.rows_affected();
    if count > 0 {
        tracing::warn!(count, "Marked interrupted ingestion runs as failed");
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn ledger() -> SqliteRunLedger {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");
        crate::db::schema::initialize_schema(&pool).await.unwrap();
        SqliteRunLedger::new(pool)
    }

    fn snapshot() -> RunConfigSnapshot {
        RunConfigSnapshot {
            target_books: 20,
            target_authors: 10,
            subjects: vec!["fantasy".into(), "history".into()],
        }
    }

    #[tokio::test]
    async fn test_create_run_starts_running() {
        let ledger = ledger().await;
        let run_id = ledger.create_run(&snapshot()).await.unwrap();

        let run = load_run(ledger.pool(), run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.config, snapshot());
        assert!(run.finished_at.is_none());
        assert_eq!(run.books_upserted, 0);
    }

    #[tokio::test]
    async fn test_update_run_persists_terminal_state() {
        let ledger = ledger().await;
        let run_id = ledger.create_run(&snapshot()).await.unwrap();

        let mut run = IngestRun::new(run_id, snapshot(), Utc::now());
        run.books_discovered = 4;
        run.books_upserted = 3;
        run.authors_discovered = 2;
        run.authors_upserted = 1;
        run.finish(Some("search for subject 'x' failed".into()), Utc::now());
        ledger.update_run(&run).await.unwrap();

        let stored = load_run(ledger.pool(), run_id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Failed);
        assert_eq!(stored.books_discovered, 4);
        assert_eq!(stored.books_upserted, 3);
        assert_eq!(stored.authors_discovered, 2);
        assert_eq!(stored.authors_upserted, 1);
        assert_eq!(stored.error, run.error);
        assert_eq!(stored.finished_at, run.finished_at);
    }

    #[tokio::test]
    async fn test_update_unknown_run_is_not_found() {
        let ledger = ledger().await;
        let run = IngestRun::new(Uuid::new_v4(), snapshot(), Utc::now());
        let err = ledger.update_run(&run).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_links_are_idempotent() {
        let ledger = ledger().await;
        let run_id = ledger.create_run(&snapshot()).await.unwrap();

        ledger.link_book(run_id, "9780000000001").await.unwrap();
        ledger.link_book(run_id, "9780000000001").await.unwrap();
        ledger.link_book(run_id, "9780000000002").await.unwrap();
        ledger.link_author(run_id, "OL1A").await.unwrap();
        ledger.link_author(run_id, "OL1A").await.unwrap();

        let detail = load_run_detail(ledger.pool(), run_id).await.unwrap().unwrap();
        assert_eq!(detail.linked_books, 2);
        assert_eq!(detail.linked_authors, 1);
        assert!(load_run_detail(ledger.pool(), Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_runs_newest_first_with_limit() {
        let ledger = ledger().await;
        let first = ledger.create_run(&snapshot()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = ledger.create_run(&snapshot()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let third = ledger.create_run(&snapshot()).await.unwrap();

        let runs = list_runs(ledger.pool(), 2).await.unwrap();
        let ids: Vec<Uuid> = runs.iter().map(|r| r.run_id).collect();
        assert_eq!(ids, vec![third, second]);
        assert!(!ids.contains(&first));
    }

    #[tokio::test]
    async fn test_fail_stale_runs_only_touches_running() {
        let ledger = ledger().await;
        let stale = ledger.create_run(&snapshot()).await.unwrap();
        let done = ledger.create_run(&snapshot()).await.unwrap();

        let mut finished = IngestRun::new(done, snapshot(), Utc::now());
        finished.finish(None, Utc::now());
        ledger.update_run(&finished).await.unwrap();

        assert_eq!(fail_stale_runs(ledger.pool()).await.unwrap(), 1);

        let stale = load_run(ledger.pool(), stale).await.unwrap().unwrap();
        assert_eq!(stale.status, RunStatus::Failed);
        assert_eq!(stale.error.as_deref(), Some(INTERRUPTED_ERROR));
        assert!(stale.finished_at.is_some());

        let done = load_run(ledger.pool(), done).await.unwrap().unwrap();
        assert_eq!(done.status, RunStatus::Completed);
        assert!(done.error.is_none());
    }
}
