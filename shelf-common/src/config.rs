//! Bootstrap configuration: root folder resolution and TOML loading
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file value
//! 4. OS-dependent default (fallback)

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "SHELF_ROOT_FOLDER";

/// Logging configuration shared by every service's TOML file
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Resolve the root folder holding the database and other service state
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml_value: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = toml_value {
        return path.to_path_buf();
    }

    default_root_folder()
}

/// OS-dependent default root folder
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("shelf"))
        .unwrap_or_else(|| PathBuf::from("./shelf_data"))
}

/// Default location of a service's TOML file (`<config dir>/shelf/<file_name>`)
pub fn default_config_path(file_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("shelf").join(file_name))
}

/// Read a TOML file into `T`.
///
/// A missing file yields `T::default()`; a file that exists but cannot be
/// read or parsed is a configuration error.
pub fn load_toml<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        tracing::debug!(path = %path.display(), "Config file not found, using defaults");
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;

    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Ensure the root folder exists and return the default database path inside it
pub fn prepare_root_folder(root: &Path, db_file_name: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(root)?;
    Ok(root.join(db_file_name))
}

/// Client identifier sent with every outbound request
pub fn user_agent() -> String {
    format!("shelf-ingest/{} (catalog sync)", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Sample {
        #[serde(default)]
        name: String,
        #[serde(default)]
        logging: LoggingConfig,
    }

    #[test]
    #[serial]
    fn test_cli_argument_wins() {
        std::env::set_var(ROOT_FOLDER_ENV, "/from/env");
        let resolved = resolve_root_folder(Some(Path::new("/from/cli")), Some(Path::new("/from/toml")));
        std::env::remove_var(ROOT_FOLDER_ENV);
        assert_eq!(resolved, PathBuf::from("/from/cli"));
    }

    #[test]
    #[serial]
    fn test_env_beats_toml() {
        std::env::set_var(ROOT_FOLDER_ENV, "/from/env");
        let resolved = resolve_root_folder(None, Some(Path::new("/from/toml")));
        std::env::remove_var(ROOT_FOLDER_ENV);
        assert_eq!(resolved, PathBuf::from("/from/env"));
    }

    #[test]
    #[serial]
    fn test_toml_then_default() {
        std::env::remove_var(ROOT_FOLDER_ENV);
        assert_eq!(
            resolve_root_folder(None, Some(Path::new("/from/toml"))),
            PathBuf::from("/from/toml")
        );
        assert!(resolve_root_folder(None, None).ends_with("shelf")
            || resolve_root_folder(None, None).ends_with("shelf_data"));
    }

    #[test]
    fn test_missing_toml_gives_default() {
        let dir = tempfile::tempdir().unwrap();
        let loaded: Sample = load_toml(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded, Sample::default());
        assert_eq!(loaded.logging.level, "info");
    }

    #[test]
    fn test_load_toml_parses_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svc.toml");
        std::fs::write(&path, "name = \"catalog\"\n[logging]\nlevel = \"debug\"\n").unwrap();

        let loaded: Sample = load_toml(&path).unwrap();
        assert_eq!(loaded.name, "catalog");
        assert_eq!(loaded.logging.level, "debug");
    }

    #[test]
    fn test_load_toml_rejects_bad_syntax() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "name = = 3").unwrap();

        let err = load_toml::<Sample>(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_prepare_root_folder_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested").join("root");
        let db = prepare_root_folder(&root, "shelf.db").unwrap();
        assert!(root.is_dir());
        assert_eq!(db, root.join("shelf.db"));
    }

    #[test]
    fn test_user_agent_carries_version() {
        assert!(user_agent().starts_with("shelf-ingest/"));
        assert!(user_agent().contains(env!("CARGO_PKG_VERSION")));
    }
}
