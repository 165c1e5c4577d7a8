//! Materializer: provider detail → catalog and serving records
//!
//! Pure transformation, no I/O. Callers pass the timestamp to stamp on the
//! produced records.

use chrono::{DateTime, Utc};

use crate::client::{AuthorDetail, BookDetail};
use crate::models::{CatalogAuthor, CatalogBook, ServingBook};

/// Fallback for missing publisher and genre on the serving row
pub const UNKNOWN: &str = "Unknown";

/// Everything produced from one hydrated book
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedBook {
    pub book: CatalogBook,
    pub serving: ServingBook,
    /// Author keys referenced by the book, in provider order
    pub author_keys: Vec<String>,
}

/// Build the catalog record, the serving record and the author key list
pub fn materialize_book(
    isbn: &str,
    detail: &BookDetail,
    subject: Option<&str>,
    now: DateTime<Utc>,
) -> MaterializedBook {
    let publisher = detail
        .publishers
        .iter()
        .map(|p| p.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    let cover_url = detail.cover.as_ref().and_then(|c| c.large.clone());
    let description = detail.notes.as_ref().map(|n| n.as_text().to_string());
    let language = detail
        .languages
        .first()
        .and_then(|l| l.key.rsplit('/').next())
        .filter(|code| !code.is_empty())
        .map(String::from);

    let book = CatalogBook {
        isbn: isbn.to_string(),
        title: detail.title.clone(),
        subtitle: detail.subtitle.clone(),
        description: description.clone(),
        cover_url: cover_url.clone(),
        publish_date: detail.publish_date.clone(),
        publisher: publisher.clone(),
        language,
        page_count: detail.number_of_pages,
        updated_at: now,
    };

    let serving = ServingBook {
        isbn: isbn.to_string(),
        title: detail.title.clone(),
        authors: detail
            .authors
            .iter()
            .map(|a| a.name.as_str())
            .filter(|name| !name.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        publisher: if publisher.is_empty() {
            UNKNOWN.to_string()
        } else {
            publisher
        },
        genre: subject
            .filter(|s| !s.is_empty())
            .unwrap_or(UNKNOWN)
            .to_string(),
        publication_year: detail.publish_date.as_deref().and_then(extract_year),
        cover_url,
        page_count: detail.number_of_pages,
        description,
        updated_at: now,
    };

    let author_keys = detail
        .authors
        .iter()
        .filter_map(|a| author_key_from_url(&a.url))
        .collect();

    MaterializedBook {
        book,
        serving,
        author_keys,
    }
}

/// Build the catalog author record, flattening the biography to plain text
pub fn materialize_author(key: &str, detail: &AuthorDetail, now: DateTime<Utc>) -> CatalogAuthor {
    CatalogAuthor {
        author_key: key.to_string(),
        name: detail.name.clone(),
        birth_date: detail.birth_date.clone(),
        bio: detail.bio.clone().map(|b| b.into_text()),
        updated_at: now,
    }
}

/// Last whitespace-delimited token of the date, kept only if it is exactly
/// 4 characters long. "March 1999" → "1999"; "1999-03" → None.
pub fn extract_year(publish_date: &str) -> Option<String> {
    publish_date
        .split_whitespace()
        .last()
        .filter(|token| token.chars().count() == 4)
        .map(String::from)
}

/// Path segment after `authors` in a profile URL:
/// `https://openlibrary.org/authors/OL23919A/J._K._Rowling` → `OL23919A`
pub fn author_key_from_url(url: &str) -> Option<String> {
    let mut segments = url.split('/');
    segments.find(|s| *s == "authors")?;
    segments
        .next()
        .filter(|key| !key.is_empty())
        .map(String::from)
}

/// Prefer a 13-character identifier, otherwise take the first one listed
pub fn preferred_identifier(ids: &[String]) -> Option<&str> {
    ids.iter()
        .find(|id| id.len() == 13)
        .or_else(|| ids.first())
        .map(String::as_str)
}
