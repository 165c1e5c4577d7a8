//! # Shelf Common Library
//!
//! Shared code for the shelf services:
//! - Common error and result types
//! - Bootstrap configuration (root folder, TOML loading, user agent)
//! - Shared-secret authentication primitives
//! - Timestamp helpers

pub mod auth;
pub mod config;
pub mod error;
pub mod time;

pub use error::{Error, Result};
