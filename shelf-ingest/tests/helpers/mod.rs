//! Test helper utilities
//!
//! In-memory fakes of the three seams the sync controller depends on
//! (`BookSource`, `CatalogStore`, `RunLedger`), plus settings and record
//! builders shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use shelf_common::{Error, Result};
use shelf_ingest::client::{
    AuthorDetail, AuthorRef, BookDetail, BookSource, ClientError, Fetched, SearchDoc,
};
use shelf_ingest::config::SyncSettings;
use shelf_ingest::models::{
    CatalogAuthor, CatalogBook, IngestRun, RunConfigSnapshot, ServingBook,
};
use shelf_ingest::store::{CatalogStore, RunLedger};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// One call observed by `FakeSource`
#[derive(Debug, Clone, PartialEq)]
pub enum SourceCall {
    Search { subject: String, limit: usize },
    Hydrate(Vec<String>),
    Author(String),
}

/// Scripted bibliographic provider
#[derive(Default)]
pub struct FakeSource {
    subjects: HashMap<String, Vec<SearchDoc>>,
    failing_subjects: HashSet<String>,
    books: HashMap<String, BookDetail>,
    failing_batches: HashSet<String>,
    authors: HashMap<String, AuthorDetail>,
    failing_authors: HashSet<String>,
    block_search: bool,
    panic_search: bool,
    calls: Mutex<Vec<SourceCall>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Search results for `subject`, one document per identifier list
    pub fn with_subject(mut self, subject: &str, docs: &[&[&str]]) -> Self {
        let docs = docs
            .iter()
            .enumerate()
            .map(|(i, ids)| SearchDoc {
                key: format!("/works/OL{}W", i),
                title: format!("{} work {}", subject, i),
                isbn: ids.iter().map(|id| id.to_string()).collect(),
            })
            .collect();
        self.subjects.insert(subject.to_string(), docs);
        self
    }

    /// Searching `subject` fails with HTTP 500 (after retries)
    pub fn with_failing_subject(mut self, subject: &str) -> Self {
        self.failing_subjects.insert(subject.to_string());
        self
    }

    /// Detail record for `isbn` written by the given authors
    pub fn with_book(mut self, isbn: &str, author_keys: &[&str]) -> Self {
        self.books.insert(isbn.to_string(), book_detail(isbn, author_keys));
        self
    }

    /// Any hydration batch containing `isbn` fails
    pub fn with_failing_batch(mut self, isbn: &str) -> Self {
        self.failing_batches.insert(isbn.to_string());
        self
    }

    pub fn with_author(mut self, key: &str) -> Self {
        self.authors.insert(
            key.to_string(),
            AuthorDetail {
                key: format!("/authors/{}", key),
                name: author_name(key),
                birth_date: Some("1900".to_string()),
                bio: None,
            },
        );
        self
    }

    pub fn with_failing_author(mut self, key: &str) -> Self {
        self.failing_authors.insert(key.to_string());
        self
    }

    /// Searches wait until the run is cancelled
    pub fn blocking(mut self) -> Self {
        self.block_search = true;
        self
    }

    /// Searches panic
    pub fn panicking(mut self) -> Self {
        self.panic_search = true;
        self
    }

    pub fn calls(&self) -> Vec<SourceCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn searched_subjects(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SourceCall::Search { subject, .. } => Some(subject),
                _ => None,
            })
            .collect()
    }

    pub fn hydrate_batches(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SourceCall::Hydrate(batch) => Some(batch),
                _ => None,
            })
            .collect()
    }

    pub fn hydrated_isbns(&self) -> Vec<String> {
        self.hydrate_batches().into_iter().flatten().collect()
    }

    pub fn fetched_authors(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SourceCall::Author(key) => Some(key),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: SourceCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl BookSource for FakeSource {
    async fn search(
        &self,
        subject: &str,
        limit: usize,
        cancel: &CancellationToken,
    ) -> std::result::Result<Vec<SearchDoc>, ClientError> {
        self.record(SourceCall::Search {
            subject: subject.to_string(),
            limit,
        });

        if self.panic_search {
            panic!("search handler crashed on {}", subject);
        }

        if self.block_search {
            cancel.cancelled().await;
            return Err(ClientError::Cancelled);
        }

        if self.failing_subjects.contains(subject) {
            return Err(ClientError::RetriesExhausted {
                retries: 3,
                last: Box::new(ClientError::Status {
                    status: 500,
                    body: "upstream down".to_string(),
                }),
            });
        }

        Ok(self.subjects.get(subject).cloned().unwrap_or_default())
    }

    async fn hydrate(
        &self,
        isbns: &[String],
        _cancel: &CancellationToken,
    ) -> std::result::Result<HashMap<String, Fetched<BookDetail>>, ClientError> {
        self.record(SourceCall::Hydrate(isbns.to_vec()));

        if isbns.iter().any(|isbn| self.failing_batches.contains(isbn)) {
            return Err(ClientError::Status {
                status: 503,
                body: "try later".to_string(),
            });
        }

        Ok(isbns
            .iter()
            .filter_map(|isbn| {
                self.books.get(isbn).map(|detail| {
                    (
                        isbn.clone(),
                        Fetched {
                            value: detail.clone(),
                            raw: serde_json::to_value(detail).unwrap(),
                        },
                    )
                })
            })
            .collect())
    }

    async fn author_detail(
        &self,
        key: &str,
        _cancel: &CancellationToken,
    ) -> std::result::Result<Fetched<AuthorDetail>, ClientError> {
        self.record(SourceCall::Author(key.to_string()));

        if self.failing_authors.contains(key) {
            return Err(ClientError::Status {
                status: 404,
                body: "not found".to_string(),
            });
        }

        let detail = self.authors.get(key).cloned().ok_or(ClientError::Status {
            status: 404,
            body: "not found".to_string(),
        })?;
        let raw = serde_json::to_value(&detail).unwrap();
        Ok(Fetched { value: detail, raw })
    }
}

/// In-memory catalog
#[derive(Default)]
pub struct FakeCatalog {
    pub books: Mutex<HashMap<String, CatalogBook>>,
    pub serving: Mutex<HashMap<String, ServingBook>>,
    pub authors: Mutex<HashMap<String, CatalogAuthor>>,
    pub raw: Mutex<HashMap<String, serde_json::Value>>,
    book_timestamps: Mutex<HashMap<String, DateTime<Utc>>>,
    author_timestamps: Mutex<HashMap<String, DateTime<Utc>>>,
    extra_books: i64,
    extra_authors: i64,
    failing_books: HashSet<String>,
    failing_authors: HashSet<String>,
    fail_counts: bool,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend the catalog already holds this many unrelated rows
    pub fn with_existing_counts(mut self, books: i64, authors: i64) -> Self {
        self.extra_books = books;
        self.extra_authors = authors;
        self
    }

    /// A book last written `days_ago` days ago
    pub fn with_book_age(self, isbn: &str, days_ago: i64) -> Self {
        self.book_timestamps
            .lock()
            .unwrap()
            .insert(isbn.to_string(), Utc::now() - Duration::days(days_ago));
        self
    }

    /// An author last written `days_ago` days ago
    pub fn with_author_age(self, key: &str, days_ago: i64) -> Self {
        self.author_timestamps
            .lock()
            .unwrap()
            .insert(key.to_string(), Utc::now() - Duration::days(days_ago));
        self
    }

    pub fn with_failing_book(mut self, isbn: &str) -> Self {
        self.failing_books.insert(isbn.to_string());
        self
    }

    pub fn with_failing_author(mut self, key: &str) -> Self {
        self.failing_authors.insert(key.to_string());
        self
    }

    pub fn with_failing_counts(mut self) -> Self {
        self.fail_counts = true;
        self
    }

    pub fn book_isbns(&self) -> Vec<String> {
        let mut isbns: Vec<String> = self.books.lock().unwrap().keys().cloned().collect();
        isbns.sort();
        isbns
    }

    pub fn serving_row(&self, isbn: &str) -> Option<ServingBook> {
        self.serving.lock().unwrap().get(isbn).cloned()
    }

    pub fn author_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.authors.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl CatalogStore for FakeCatalog {
    async fn upsert_book(&self, book: &CatalogBook, raw: &serde_json::Value) -> Result<()> {
        if self.failing_books.contains(&book.isbn) {
            return Err(Error::Internal(format!("disk full writing {}", book.isbn)));
        }
        self.books.lock().unwrap().insert(book.isbn.clone(), book.clone());
        self.book_timestamps
            .lock()
            .unwrap()
            .insert(book.isbn.clone(), book.updated_at);
        self.raw
            .lock()
            .unwrap()
            .insert(format!("book:{}", book.isbn), raw.clone());
        Ok(())
    }

    async fn upsert_serving_book(&self, book: &ServingBook) -> Result<()> {
        self.serving.lock().unwrap().insert(book.isbn.clone(), book.clone());
        Ok(())
    }

    async fn upsert_author(&self, author: &CatalogAuthor, raw: &serde_json::Value) -> Result<()> {
        if self.failing_authors.contains(&author.author_key) {
            return Err(Error::Internal(format!("disk full writing {}", author.author_key)));
        }
        self.authors
            .lock()
            .unwrap()
            .insert(author.author_key.clone(), author.clone());
        self.author_timestamps
            .lock()
            .unwrap()
            .insert(author.author_key.clone(), author.updated_at);
        self.raw
            .lock()
            .unwrap()
            .insert(format!("author:{}", author.author_key), raw.clone());
        Ok(())
    }

    async fn total_books(&self) -> Result<i64> {
        if self.fail_counts {
            return Err(Error::Internal("database locked".to_string()));
        }
        Ok(self.extra_books + self.books.lock().unwrap().len() as i64)
    }

    async fn total_authors(&self) -> Result<i64> {
        if self.fail_counts {
            return Err(Error::Internal("database locked".to_string()));
        }
        Ok(self.extra_authors + self.authors.lock().unwrap().len() as i64)
    }

    async fn book_updated_at(&self, isbn: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.book_timestamps.lock().unwrap().get(isbn).copied())
    }

    async fn author_updated_at(&self, author_key: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.author_timestamps.lock().unwrap().get(author_key).copied())
    }
}

/// In-memory run ledger
#[derive(Default)]
pub struct FakeLedger {
    pub created: Mutex<Vec<(Uuid, RunConfigSnapshot)>>,
    pub updates: Mutex<Vec<IngestRun>>,
    pub book_links: Mutex<Vec<(Uuid, String)>>,
    pub author_links: Mutex<Vec<(Uuid, String)>>,
    fail_create: bool,
    fail_links: bool,
}

impl FakeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn with_failing_links(mut self) -> Self {
        self.fail_links = true;
        self
    }

    /// Most recently persisted state of the run
    pub fn last_update(&self) -> Option<IngestRun> {
        self.updates.lock().unwrap().last().cloned()
    }

    pub fn linked_books(&self) -> Vec<String> {
        self.book_links
            .lock()
            .unwrap()
            .iter()
            .map(|(_, isbn)| isbn.clone())
            .collect()
    }

    pub fn linked_authors(&self) -> Vec<String> {
        self.author_links
            .lock()
            .unwrap()
            .iter()
            .map(|(_, key)| key.clone())
            .collect()
    }
}

#[async_trait]
impl RunLedger for FakeLedger {
    async fn create_run(&self, config: &RunConfigSnapshot) -> Result<Uuid> {
        if self.fail_create {
            return Err(Error::Internal("ledger unavailable".to_string()));
        }
        let run_id = Uuid::new_v4();
        self.created.lock().unwrap().push((run_id, config.clone()));
        Ok(run_id)
    }

    async fn update_run(&self, run: &IngestRun) -> Result<()> {
        self.updates.lock().unwrap().push(run.clone());
        Ok(())
    }

    async fn link_book(&self, run_id: Uuid, isbn: &str) -> Result<()> {
        if self.fail_links {
            return Err(Error::Internal("link table locked".to_string()));
        }
        self.book_links.lock().unwrap().push((run_id, isbn.to_string()));
        Ok(())
    }

    async fn link_author(&self, run_id: Uuid, author_key: &str) -> Result<()> {
        if self.fail_links {
            return Err(Error::Internal("link table locked".to_string()));
        }
        self.author_links
            .lock()
            .unwrap()
            .push((run_id, author_key.to_string()));
        Ok(())
    }
}

/// Sync settings for tests
pub fn settings(target_books: i64, target_authors: i64, subjects: &[&str]) -> SyncSettings {
    SyncSettings {
        target_books,
        target_authors,
        subjects: subjects.iter().map(|s| s.to_string()).collect(),
        batch_size: 50,
        freshness_days: 30,
        run_timeout_secs: 60,
    }
}

pub fn author_name(key: &str) -> String {
    format!("Author {}", key)
}

/// Book detail as the provider would return it
pub fn book_detail(isbn: &str, author_keys: &[&str]) -> BookDetail {
    let mut detail: BookDetail = serde_json::from_value(json!({
        "title": format!("Title {}", isbn),
        "publishers": [{"name": "Test Press"}],
        "publish_date": "March 2001",
        "number_of_pages": 200,
        "cover": {"large": format!("https://covers.example/{}-L.jpg", isbn)},
        "languages": [{"key": "/languages/eng"}]
    }))
    .unwrap();

    detail.authors = author_keys
        .iter()
        .map(|key| AuthorRef {
            url: format!("https://openlibrary.org/authors/{}/{}", key, author_name(key).replace(' ', "_")),
            name: author_name(key),
        })
        .collect();

    detail
}
