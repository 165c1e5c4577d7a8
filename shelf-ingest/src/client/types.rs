//! Response shapes of the bibliographic API
//!
//! Only the fields the pipeline reads are decoded; everything else survives in
//! the raw JSON archived alongside each catalog record.

use serde::{Deserialize, Serialize};

/// `/search.json` response
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SearchResponse {
    #[serde(rename = "numFound", default)]
    pub num_found: u64,
    #[serde(default)]
    pub docs: Vec<SearchDoc>,
}

/// One search hit. `isbn` may be empty or hold several lengths.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct SearchDoc {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub isbn: Vec<String>,
}

/// Text fields the provider returns either as a bare string or as
/// `{"type": "/type/text", "value": "..."}`
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum TextBlock {
    PlainText(String),
    Structured { value: String },
}

impl TextBlock {
    /// Plain-text content regardless of the wire shape
    pub fn into_text(self) -> String {
        match self {
            TextBlock::PlainText(text) => text,
            TextBlock::Structured { value } => value,
        }
    }

    pub fn as_text(&self) -> &str {
        match self {
            TextBlock::PlainText(text) => text,
            TextBlock::Structured { value } => value,
        }
    }
}

/// Per-identifier entry of `/api/books?jscmd=data`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BookDetail {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub authors: Vec<AuthorRef>,
    #[serde(default)]
    pub publishers: Vec<NamedEntry>,
    #[serde(default)]
    pub publish_date: Option<String>,
    #[serde(default)]
    pub number_of_pages: Option<i64>,
    #[serde(default)]
    pub cover: Option<CoverLinks>,
    #[serde(default)]
    pub notes: Option<TextBlock>,
    #[serde(default)]
    pub languages: Vec<KeyRef>,
}

/// Author reference inside a book detail (`url` is the author's profile page)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthorRef {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NamedEntry {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct KeyRef {
    #[serde(default)]
    pub key: String,
}

/// Cover image URLs by size variant
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CoverLinks {
    pub small: Option<String>,
    pub medium: Option<String>,
    pub large: Option<String>,
}

/// `/authors/<key>.json` response
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthorDetail {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub bio: Option<TextBlock>,
}

/// A decoded value plus the exact JSON it was decoded from
#[derive(Debug, Clone)]
pub struct Fetched<T> {
    pub value: T,
    pub raw: serde_json::Value,
}
