//! Table definitions
//!
//! Every statement is idempotent (`IF NOT EXISTS`), so initialization runs on
//! every startup.

use shelf_common::Result;
use sqlx::SqlitePool;

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS books (
        isbn TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        subtitle TEXT,
        description TEXT,
        cover_url TEXT,
        publish_date TEXT,
        publisher TEXT NOT NULL DEFAULT '',
        language TEXT,
        page_count INTEGER,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS authors (
        author_key TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        birth_date TEXT,
        bio TEXT,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sources (
        entity_type TEXT NOT NULL,
        entity_key TEXT NOT NULL,
        provider TEXT NOT NULL,
        raw_json TEXT NOT NULL,
        fetched_at TEXT NOT NULL,
        PRIMARY KEY (entity_type, entity_key, provider)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS serving_books (
        isbn TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        authors TEXT NOT NULL DEFAULT '',
        publisher TEXT NOT NULL,
        genre TEXT NOT NULL,
        publication_year TEXT,
        cover_url TEXT,
        page_count INTEGER,
        description TEXT,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ingest_runs (
        run_id TEXT PRIMARY KEY,
        status TEXT NOT NULL,
        started_at TEXT NOT NULL,
        finished_at TEXT,
        target_books INTEGER NOT NULL,
        target_authors INTEGER NOT NULL,
        subjects TEXT NOT NULL,
        books_discovered INTEGER NOT NULL DEFAULT 0,
        books_upserted INTEGER NOT NULL DEFAULT 0,
        authors_discovered INTEGER NOT NULL DEFAULT 0,
        authors_upserted INTEGER NOT NULL DEFAULT 0,
        error TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ingest_run_books (
        run_id TEXT NOT NULL REFERENCES ingest_runs(run_id),
        isbn TEXT NOT NULL,
        PRIMARY KEY (run_id, isbn)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ingest_run_authors (
        run_id TEXT NOT NULL REFERENCES ingest_runs(run_id),
        author_key TEXT NOT NULL,
        PRIMARY KEY (run_id, author_key)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_ingest_runs_started_at ON ingest_runs(started_at)",
];

/// Create all tables used by shelf-ingest
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }

    tracing::info!("Database tables initialized");
    Ok(())
}
