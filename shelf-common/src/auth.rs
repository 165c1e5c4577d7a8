//! Shared-secret authentication for trigger endpoints
//!
//! The secret is a random hex string. When no secret is configured, one is
//! generated on first use and persisted in the `settings` table under
//! `ingest_shared_secret`, so restarts keep accepting the same value.
//!
//! Comparison is done on SHA-256 digests of both values, so the check runs
//! over fixed-length input regardless of what the caller presents.

use sha2::{Digest, Sha256};
use thiserror::Error;

#[cfg(feature = "sqlx")]
use sqlx::SqlitePool;

/// Settings key holding the persisted secret
pub const SHARED_SECRET_KEY: &str = "ingest_shared_secret";

/// Authentication error types
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AuthError {
    /// No secret was presented with the request
    #[error("Missing shared secret")]
    MissingSecret,

    /// Presented secret does not match
    #[error("Invalid shared secret")]
    InvalidSecret,

    /// Database error loading or storing the secret
    #[error("Database error: {0}")]
    DatabaseError(String),
}

/// Check a presented secret against the expected one
pub fn verify_secret(presented: Option<&str>, expected: &str) -> Result<(), AuthError> {
    let presented = presented
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(AuthError::MissingSecret)?;

    let lhs = Sha256::digest(presented.as_bytes());
    let rhs = Sha256::digest(expected.as_bytes());

    let diff = lhs
        .iter()
        .zip(rhs.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b));

    if diff == 0 {
        Ok(())
    } else {
        Err(AuthError::InvalidSecret)
    }
}

/// Generate a new random secret (64 hex characters)
pub fn generate_secret() -> String {
    use rand::RngCore;

    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Load the persisted secret, generating and storing one if absent
#[cfg(feature = "sqlx")]
pub async fn load_or_init_shared_secret(db: &SqlitePool) -> Result<String, AuthError> {
    let existing: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(SHARED_SECRET_KEY)
        .fetch_optional(db)
        .await
        .map_err(|e| AuthError::DatabaseError(e.to_string()))?;

    if let Some((value,)) = existing {
        if !value.trim().is_empty() {
            return Ok(value);
        }
    }

    let secret = generate_secret();
    sqlx::query("INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)")
        .bind(SHARED_SECRET_KEY)
        .bind(&secret)
        .execute(db)
        .await
        .map_err(|e| AuthError::DatabaseError(e.to_string()))?;

    tracing::info!("Generated new ingest shared secret (stored in settings)");

    Ok(secret)
}
