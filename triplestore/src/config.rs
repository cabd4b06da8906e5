//! Store configuration module.
//!
//! This module loads the configuration of the `triplestore` binary from
//! environment variables.
//!
//! # Environment Variables
//!
//! - `TRIPLESTORE_DATABASE_PATH`: Database file (default: `./data/triples.db`)
//! - `TRIPLESTORE_BUFFER_POOL_PAGES`: Pages in the buffer pool (default: `1024`)
//! - `TRIPLESTORE_SYNC_ON_COMMIT`: Sync the journal and file on commit
//!   (default: `true`)
//!
//! # Invariants
//!
//! - `database_path` is always a valid path (may not exist yet)
//! - `buffer_pool_pages` is always > 0

use std::path::PathBuf;

/// Store configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Path of the database file. The rollback journal lives next to it.
    pub database_path: PathBuf,
    /// Number of 8 KiB page buffers kept for reuse.
    pub buffer_pool_pages: usize,
    /// Whether commits wait for the device to make writes durable.
    /// Turning this off trades crash safety for speed.
    pub sync_on_commit: bool,
}

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(Self::DEFAULT_DATABASE_PATH),
            buffer_pool_pages: Self::DEFAULT_BUFFER_POOL_PAGES,
            sync_on_commit: true,
        }
    }
}

impl StoreConfig {
    /// Default database file.
    pub const DEFAULT_DATABASE_PATH: &'static str = "./data/triples.db";
    /// Default buffer pool size (8 MiB of pages).
    pub const DEFAULT_BUFFER_POOL_PAGES: usize = 1024;

    pub const DATABASE_PATH_VAR: &'static str = "TRIPLESTORE_DATABASE_PATH";
    pub const BUFFER_POOL_PAGES_VAR: &'static str = "TRIPLESTORE_BUFFER_POOL_PAGES";
    pub const SYNC_ON_COMMIT_VAR: &'static str = "TRIPLESTORE_SYNC_ON_COMMIT";

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `TRIPLESTORE_BUFFER_POOL_PAGES` is set but not a positive integer
    /// - `TRIPLESTORE_SYNC_ON_COMMIT` is set but not a boolean
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which returns the value of a
    /// variable if it is set.
    ///
    /// # Errors
    ///
    /// Same as [`StoreConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let database_path = lookup(Self::DATABASE_PATH_VAR)
            .filter(|value| !value.is_empty())
            .map_or(defaults.database_path, PathBuf::from);

        let buffer_pool_pages = match lookup(Self::BUFFER_POOL_PAGES_VAR) {
            Some(value) => match value.trim().parse::<usize>() {
                Ok(pages) if pages > 0 => pages,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        name: Self::BUFFER_POOL_PAGES_VAR.to_string(),
                        message: format!("'{value}' is not a positive number of pages"),
                    });
                }
            },
            None => defaults.buffer_pool_pages,
        };

        let sync_on_commit = match lookup(Self::SYNC_ON_COMMIT_VAR) {
            Some(value) => parse_bool(&value).ok_or_else(|| ConfigError::InvalidValue {
                name: Self::SYNC_ON_COMMIT_VAR.to_string(),
                message: format!("'{value}' is not a boolean (use true/false, 1/0, yes/no)"),
            })?,
            None => defaults.sync_on_commit,
        };

        Ok(Self {
            database_path,
            buffer_pool_pages,
            sync_on_commit,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
