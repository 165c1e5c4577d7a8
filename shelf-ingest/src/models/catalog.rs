//! Catalog records written by a run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provider name recorded on provenance rows
pub const PROVIDER: &str = "openlibrary";

/// Canonical book record, keyed by 13-digit ISBN
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogBook {
    pub isbn: String,
    pub title: String,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub cover_url: Option<String>,
    pub publish_date: Option<String>,
    /// Publisher names joined with ", " (empty when none)
    pub publisher: String,
    pub language: Option<String>,
    pub page_count: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

/// Canonical author record, keyed by provider author key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogAuthor {
    pub author_key: String,
    pub name: String,
    pub birth_date: Option<String>,
    pub bio: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Denormalized row read by the serving path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServingBook {
    pub isbn: String,
    pub title: String,
    /// Author display names joined with ", "
    pub authors: String,
    /// "Unknown" when the provider lists no publisher
    pub publisher: String,
    /// Subject the book was discovered under, or "Unknown"
    pub genre: String,
    /// Last 4-character token of the publish date, if any
    pub publication_year: Option<String>,
    pub cover_url: Option<String>,
    pub page_count: Option<i64>,
    pub description: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Entity kinds archived in the provenance table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityType {
    Book,
    Author,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Book => "book",
            EntityType::Author => "author",
        }
    }
}
