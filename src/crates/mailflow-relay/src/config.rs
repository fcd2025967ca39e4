//! Environment-driven relay configuration
//!
//! The relay never silently falls back to in-memory storage: when durable
//! persistence is requested, a missing database URL is surfaced before any
//! engine invocation.

use crate::error::{RelayError, Result};

/// Environment variable naming the SQLite database URL
pub const DATABASE_URL_ENV: &str = "MAILFLOW_DATABASE_URL";

/// Configuration for a relay backed by durable persistence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// SQLite connection URL, e.g. `sqlite:mailflow.db`
    pub database_url: String,
}

impl RelayConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
        }
    }

    /// Read the configuration from the environment. A missing or empty
    /// `MAILFLOW_DATABASE_URL` is an error, not a fallback.
    pub fn from_env() -> Result<Self> {
        match std::env::var(DATABASE_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => Ok(Self { database_url: url }),
            _ => Err(RelayError::PersistenceUnavailable(format!(
                "{} is not set",
                DATABASE_URL_ENV
            ))),
        }
    }
}
