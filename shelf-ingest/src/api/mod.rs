//! HTTP API handlers for shelf-ingest
//!
//! - `POST /ingest/runs`: start a run (shared secret required)
//! - `GET /ingest/runs`, `GET /ingest/runs/:run_id`: run status
//! - `POST /ingest/runs/active/cancel`: cancel the active run
//! - `GET /health`

pub mod health;
pub mod ingest;

pub use health::health_routes;
pub use ingest::ingest_routes;
