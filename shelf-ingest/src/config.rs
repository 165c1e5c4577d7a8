//! Configuration resolution for shelf-ingest
//!
//! Priority (highest first): command line → environment → TOML → defaults.
//! The binary applies command-line values on top of what `ServiceConfig::load`
//! returns; everything below that happens here.

use serde::Deserialize;
use shelf_common::config::LoggingConfig;
use shelf_common::{Error, Result};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::models::RunConfigSnapshot;

/// Default TOML file name under the shelf config directory
pub const CONFIG_FILE_NAME: &str = "shelf-ingest.toml";

/// Default database file name inside the root folder
pub const DB_FILE_NAME: &str = "shelf.db";

/// Longest accepted freshness window (100 years)
pub const MAX_FRESHNESS_DAYS: i64 = 36_500;

/// Slowest accepted request rate (one request every ~17 minutes)
pub const MIN_REQUESTS_PER_SECOND: f64 = 0.001;

/// Complete service configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Root folder for service state (optional, see `shelf_common::config`)
    pub root_folder: Option<PathBuf>,
    /// Explicit database path; defaults to `<root>/shelf.db`
    pub database_path: Option<PathBuf>,
    /// HTTP bind address
    pub host: String,
    /// HTTP port
    pub port: u16,
    /// Shared secret required by the trigger endpoint
    pub ingest_secret: Option<String>,
    pub logging: LoggingConfig,
    pub sync: SyncSettings,
    pub api: ApiSettings,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            database_path: None,
            host: "127.0.0.1".to_string(),
            port: 5740,
            ingest_secret: None,
            logging: LoggingConfig::default(),
            sync: SyncSettings::default(),
            api: ApiSettings::default(),
        }
    }
}

/// Targets and pacing of one ingestion run
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncSettings {
    /// Desired total number of catalog books
    pub target_books: i64,
    /// Desired total number of catalog authors
    pub target_authors: i64,
    /// Subjects searched in order, first to last
    pub subjects: Vec<String>,
    /// Identifiers per hydration request
    pub batch_size: usize,
    /// Entities updated within this many days are not re-fetched
    pub freshness_days: i64,
    /// Upper bound on a background run before it is cancelled
    pub run_timeout_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            target_books: 1000,
            target_authors: 500,
            subjects: [
                "fiction",
                "science_fiction",
                "fantasy",
                "mystery",
                "romance",
                "history",
                "biography",
                "science",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            batch_size: 50,
            freshness_days: 30,
            run_timeout_secs: 30 * 60,
        }
    }
}

impl SyncSettings {
    pub fn freshness_window(&self) -> chrono::Duration {
        chrono::Duration::days(self.freshness_days.clamp(0, MAX_FRESHNESS_DAYS))
    }

    pub fn run_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.run_timeout_secs)
    }

    /// The parts of the configuration recorded on every run
    pub fn snapshot(&self) -> RunConfigSnapshot {
        RunConfigSnapshot {
            target_books: self.target_books,
            target_authors: self.target_authors,
            subjects: self.subjects.clone(),
        }
    }
}

/// External API pacing
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    pub requests_per_second: f64,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://openlibrary.org".to_string(),
            requests_per_second: 1.0,
            max_retries: 3,
            timeout_secs: 30,
        }
    }
}

impl ServiceConfig {
    /// Load TOML (explicit path or the default location), apply environment
    /// overrides, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config: ServiceConfig = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(Error::Config(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                shelf_common::config::load_toml(path)?
            }
            None => match shelf_common::config::default_config_path(CONFIG_FILE_NAME) {
                Some(default_path) => shelf_common::config::load_toml(&default_path)?,
                None => ServiceConfig::default(),
            },
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Override individual settings from `SHELF_*` environment variables
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(v) = env_parse("SHELF_TARGET_BOOKS")? {
            self.sync.target_books = v;
        }
        if let Some(v) = env_parse("SHELF_TARGET_AUTHORS")? {
            self.sync.target_authors = v;
        }
        if let Some(v) = env_string("SHELF_SUBJECTS") {
            self.sync.subjects = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = env_parse("SHELF_BATCH_SIZE")? {
            self.sync.batch_size = v;
        }
        if let Some(v) = env_parse("SHELF_FRESHNESS_DAYS")? {
            self.sync.freshness_days = v;
        }
        if let Some(v) = env_string("SHELF_API_BASE_URL") {
            self.api.base_url = v;
        }
        if let Some(v) = env_parse("SHELF_API_RPS")? {
            self.api.requests_per_second = v;
        }
        if let Some(v) = env_parse("SHELF_API_MAX_RETRIES")? {
            self.api.max_retries = v;
        }
        if let Some(v) = env_string("SHELF_INGEST_SECRET") {
            self.ingest_secret = Some(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.sync.batch_size == 0 {
            return Err(Error::Config("sync.batch_size must be at least 1".into()));
        }
        if self.sync.subjects.is_empty() {
            return Err(Error::Config("sync.subjects must name at least one subject".into()));
        }
        if self.sync.target_books < 0 || self.sync.target_authors < 0 {
            return Err(Error::Config("sync targets must not be negative".into()));
        }
        if !(0..=MAX_FRESHNESS_DAYS).contains(&self.sync.freshness_days) {
            return Err(Error::Config(format!(
                "sync.freshness_days must be between 0 and {}, got {}",
                MAX_FRESHNESS_DAYS, self.sync.freshness_days
            )));
        }
        if !self.api.requests_per_second.is_finite()
            || self.api.requests_per_second < MIN_REQUESTS_PER_SECOND
        {
            return Err(Error::Config(format!(
                "api.requests_per_second must be at least {}, got {}",
                MIN_REQUESTS_PER_SECOND, self.api.requests_per_second
            )));
        }
        Ok(())
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::Config(format!("{}={:?} is invalid: {}", name, raw, e))),
        None => Ok(None),
    }
}
