//! Ingestion run state machine
//!
//! RUNNING (initial) → COMPLETED (no error) | FAILED (error recorded).
//! A run is finalized exactly once; later attempts are ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Completed => "COMPLETED",
            RunStatus::Failed => "FAILED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "RUNNING" => Some(RunStatus::Running),
            "COMPLETED" => Some(RunStatus::Completed),
            "FAILED" => Some(RunStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration in effect when the run started
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfigSnapshot {
    pub target_books: i64,
    pub target_authors: i64,
    pub subjects: Vec<String>,
}

/// One ingestion run as recorded in the ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRun {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub config: RunConfigSnapshot,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Identifiers that passed dedup and freshness filters
    pub books_discovered: i64,
    pub books_upserted: i64,
    /// Distinct author keys referenced by written books
    pub authors_discovered: i64,
    pub authors_upserted: i64,
    pub error: Option<String>,
}

impl IngestRun {
    pub fn new(run_id: Uuid, config: RunConfigSnapshot, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            status: RunStatus::Running,
            config,
            started_at,
            finished_at: None,
            books_discovered: 0,
            books_upserted: 0,
            authors_discovered: 0,
            authors_upserted: 0,
            error: None,
        }
    }

    /// Move to COMPLETED (`error == None`) or FAILED, stamping the finish time.
    ///
    /// Returns false if the run was already terminal.
    pub fn finish(&mut self, error: Option<String>, at: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }

        self.status = if error.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        self.error = error;
        self.finished_at = Some(at);
        true
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Run record plus how many entities it touched
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunDetail {
    #[serde(flatten)]
    pub run: IngestRun,
    pub linked_books: i64,
    pub linked_authors: i64,
}
