//! Data models for shelf-ingest
//!
//! - Run audit record and its state machine
//! - Catalog records produced by the materializer

pub mod catalog;
pub mod run;

pub use catalog::{CatalogAuthor, CatalogBook, EntityType, ServingBook, PROVIDER};
pub use run::{IngestRun, RunConfigSnapshot, RunDetail, RunStatus};
