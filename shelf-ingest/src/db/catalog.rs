//! Catalog persistence: books, authors, serving rows and provenance
//!
//! All writes are last-writer-wins upserts, safe to repeat for the same key
//! from overlapping runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shelf_common::time::{parse_db_string, to_db_string};
use shelf_common::Result;
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::models::{CatalogAuthor, CatalogBook, EntityType, ServingBook, PROVIDER};
use crate::store::CatalogStore;

#[derive(Clone)]
pub struct SqliteCatalogStore {
    pool: SqlitePool,
}

impl SqliteCatalogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn updated_at(&self, sql: &str, key: &str) -> Result<Option<DateTime<Utc>>> {
        let value: Option<String> = sqlx::query_scalar(sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        value.as_deref().map(parse_db_string).transpose()
    }
}

async fn upsert_source(
    tx: &mut Transaction<'_, Sqlite>,
    entity_type: EntityType,
    entity_key: &str,
    raw: &serde_json::Value,
    fetched_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sources (entity_type, entity_key, provider, raw_json, fetched_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(entity_type, entity_key, provider) DO UPDATE SET
            raw_json = excluded.raw_json,
            fetched_at = excluded.fetched_at
        "#,
    )
    .bind(entity_type.as_str())
    .bind(entity_key)
    .bind(PROVIDER)
    .bind(serde_json::to_string(raw)?)
    .bind(to_db_string(fetched_at))
    .execute(&mut **tx)
    .await?;

    Ok(())
}

#[async_trait]
impl CatalogStore for SqliteCatalogStore {
    async fn upsert_book(&self, book: &CatalogBook, raw: &serde_json::Value) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO books (
                isbn, title, subtitle, description, cover_url, publish_date,
                publisher, language, page_count, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(isbn) DO UPDATE SET
                title = excluded.title,
                subtitle = excluded.subtitle,
                description = excluded.description,
                cover_url = excluded.cover_url,
                publish_date = excluded.publish_date,
                publisher = excluded.publisher,
                language = excluded.language,
                page_count = excluded.page_count,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&book.isbn)
        .bind(&book.title)
        .bind(&book.subtitle)
        .bind(&book.description)
        .bind(&book.cover_url)
        .bind(&book.publish_date)
        .bind(&book.publisher)
        .bind(&book.language)
        .bind(book.page_count)
        .bind(to_db_string(book.updated_at))
        .execute(&mut *tx)
        .await?;

        upsert_source(&mut tx, EntityType::Book, &book.isbn, raw, book.updated_at).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn upsert_serving_book(&self, book: &ServingBook) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO serving_books (
                isbn, title, authors, publisher, genre, publication_year,
                cover_url, page_count, description, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(isbn) DO UPDATE SET
                title = excluded.title,
                authors = excluded.authors,
                publisher = excluded.publisher,
                genre = excluded.genre,
                publication_year = excluded.publication_year,
                cover_url = excluded.cover_url,
                page_count = excluded.page_count,
                description = excluded.description,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&book.isbn)
        .bind(&book.title)
        .bind(&book.authors)
        .bind(&book.publisher)
        .bind(&book.genre)
        .bind(&book.publication_year)
        .bind(&book.cover_url)
        .bind(book.page_count)
        .bind(&book.description)
        .bind(to_db_string(book.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upsert_author(&self, author: &CatalogAuthor, raw: &serde_json::Value) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO authors (author_key, name, birth_date, bio, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(author_key) DO UPDATE SET
                name = excluded.name,
                birth_date = excluded.birth_date,
                bio = excluded.bio,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&author.author_key)
        .bind(&author.name)
        .bind(&author.birth_date)
        .bind(&author.bio)
        .bind(to_db_string(author.updated_at))
        .execute(&mut *tx)
        .await?;

        upsert_source(&mut tx, EntityType::Author, &author.author_key, raw, author.updated_at).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn total_books(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn total_authors(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM authors")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn book_updated_at(&self, isbn: &str) -> Result<Option<DateTime<Utc>>> {
        self.updated_at("SELECT updated_at FROM books WHERE isbn = ?", isbn)
            .await
    }

    async fn author_updated_at(&self, author_key: &str) -> Result<Option<DateTime<Utc>>> {
        self.updated_at("SELECT updated_at FROM authors WHERE author_key = ?", author_key)
            .await
    }
}
