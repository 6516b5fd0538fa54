//! # Persistence Configuration Module
//!
//! Provides configuration management for the persistence core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a
//! [`PersistenceConfig`] holding every tunable the repository facade needs:
//! where the database lives, how large a bulk-save transaction may grow, which
//! commit policy decides the batch boundaries, and which principal to stamp
//! when the host does not resolve one itself. Validation is fail-fast: an
//! invalid configuration never reaches the store.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{BatchCommitPolicy, PersistenceConfig};
//!
//! let config = PersistenceConfig::builder()
//!     .database_path("/path/to/media.db")
//!     .batch_threshold(250)
//!     .commit_policy(BatchCommitPolicy::TrailingEdge)
//!     .build()
//!     .expect("Failed to build config");
//! ```
//!
//! Configurations can also be loaded from JSON, with every field optional:
//!
//! ```ignore
//! let config = PersistenceConfig::from_json_str(r#"{ "batch_threshold": 50 }"#)?;
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default number of items staged before a bulk save commits partial progress
pub const DEFAULT_BATCH_THRESHOLD: usize = 100;

/// Default connection pool size for file-backed databases
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Decides at which item index a bulk save flushes the pending unit of work.
///
/// `LeadingEdge` commits when `index % threshold == 0`, so the very first item
/// is committed on its own and later transactions hold `threshold` items.
/// `TrailingEdge` commits when `(index + 1) % threshold == 0`, so every
/// transaction except the tail holds exactly `threshold` items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchCommitPolicy {
    #[default]
    LeadingEdge,
    TrailingEdge,
}

/// Configuration for the persistence core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// SQLite database file; `None` selects an in-memory database
    pub database_path: Option<PathBuf>,

    /// Maximum number of pooled connections (forced to 1 for in-memory databases)
    pub max_connections: u32,

    /// Items per bulk-save transaction
    pub batch_threshold: usize,

    /// Batch boundary policy
    pub commit_policy: BatchCommitPolicy,

    /// Principal stamped into audit fields instead of the process account
    pub principal: Option<String>,

    /// Capacity of the persistence event channel
    pub event_buffer_size: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            batch_threshold: DEFAULT_BATCH_THRESHOLD,
            commit_policy: BatchCommitPolicy::default(),
            principal: None,
            event_buffer_size: 100,
        }
    }
}

impl PersistenceConfig {
    /// Creates a new builder for constructing a `PersistenceConfig`.
    pub fn builder() -> PersistenceConfigBuilder {
        PersistenceConfigBuilder::default()
    }

    /// Parses a JSON document and validates the result.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Whether the configuration selects an in-memory database
    pub fn is_in_memory(&self) -> bool {
        self.database_path.is_none()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Database path, when given, is not empty
    /// - Batch threshold is at least 1
    /// - Connection pool size is within 1..=64
    /// - Principal override, when given, is not blank
    /// - Event buffer can hold at least one event
    pub fn validate(&self) -> Result<()> {
        if let Some(path) = &self.database_path {
            if path.as_os_str().is_empty() {
                return Err(Error::Config("Database path cannot be empty".to_string()));
            }
        }

        if self.batch_threshold == 0 {
            return Err(Error::Config(
                "Batch threshold must be greater than 0".to_string(),
            ));
        }

        if self.max_connections == 0 || self.max_connections > 64 {
            return Err(Error::Config(format!(
                "Max connections must be between 1 and 64, got {}",
                self.max_connections
            )));
        }

        if let Some(principal) = &self.principal {
            if principal.trim().is_empty() {
                return Err(Error::Config(
                    "Principal override cannot be blank".to_string(),
                ));
            }
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for constructing [`PersistenceConfig`] instances.
#[derive(Debug, Default)]
pub struct PersistenceConfigBuilder {
    database_path: Option<PathBuf>,
    max_connections: Option<u32>,
    batch_threshold: Option<usize>,
    commit_policy: Option<BatchCommitPolicy>,
    principal: Option<String>,
    event_buffer_size: Option<usize>,
}

impl PersistenceConfigBuilder {
    /// Sets the database path. Leave unset for an in-memory database.
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the connection pool size.
    ///
    /// Default: 5
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = Some(max);
        self
    }

    /// Sets how many items a bulk save stages per transaction.
    ///
    /// Default: 100
    pub fn batch_threshold(mut self, threshold: usize) -> Self {
        self.batch_threshold = Some(threshold);
        self
    }

    /// Sets the batch boundary policy.
    ///
    /// Default: [`BatchCommitPolicy::LeadingEdge`]
    pub fn commit_policy(mut self, policy: BatchCommitPolicy) -> Self {
        self.commit_policy = Some(policy);
        self
    }

    /// Stamps this principal instead of resolving the process account.
    pub fn principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    /// Sets the persistence event channel capacity.
    ///
    /// Default: 100
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds the final configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when any value fails validation.
    pub fn build(self) -> Result<PersistenceConfig> {
        let defaults = PersistenceConfig::default();

        let config = PersistenceConfig {
            database_path: self.database_path,
            max_connections: self.max_connections.unwrap_or(defaults.max_connections),
            batch_threshold: self.batch_threshold.unwrap_or(defaults.batch_threshold),
            commit_policy: self.commit_policy.unwrap_or(defaults.commit_policy),
            principal: self.principal,
            event_buffer_size: self.event_buffer_size.unwrap_or(defaults.event_buffer_size),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid_in_memory() {
        let config = PersistenceConfig::default();

        assert!(config.is_in_memory());
        assert_eq!(config.batch_threshold, DEFAULT_BATCH_THRESHOLD);
        assert_eq!(config.commit_policy, BatchCommitPolicy::LeadingEdge);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_sets_all_fields() {
        let config = PersistenceConfig::builder()
            .database_path("/tmp/media.db")
            .max_connections(8)
            .batch_threshold(25)
            .commit_policy(BatchCommitPolicy::TrailingEdge)
            .principal("svc-import")
            .event_buffer_size(16)
            .build()
            .unwrap();

        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/media.db")));
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.batch_threshold, 25);
        assert_eq!(config.commit_policy, BatchCommitPolicy::TrailingEdge);
        assert_eq!(config.principal.as_deref(), Some("svc-import"));
        assert_eq!(config.event_buffer_size, 16);
        assert!(!config.is_in_memory());
    }

    #[test]
    fn test_zero_batch_threshold_rejected() {
        let result = PersistenceConfig::builder().batch_threshold(0).build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_connection_bounds_rejected() {
        assert!(PersistenceConfig::builder().max_connections(0).build().is_err());
        assert!(PersistenceConfig::builder().max_connections(65).build().is_err());
    }

    #[test]
    fn test_blank_principal_rejected() {
        let result = PersistenceConfig::builder().principal("   ").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_database_path_rejected() {
        let result = PersistenceConfig::builder().database_path("").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let json = r#"{ "batch_threshold": 50, "commit_policy": "trailing_edge" }"#;
        let config = PersistenceConfig::from_json_str(json).unwrap();

        assert_eq!(config.batch_threshold, 50);
        assert_eq!(config.commit_policy, BatchCommitPolicy::TrailingEdge);
        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert!(config.is_in_memory());
    }

    #[test]
    fn test_from_json_validates() {
        let result = PersistenceConfig::from_json_str(r#"{ "batch_threshold": 0 }"#);
        assert!(result.is_err());

        let result = PersistenceConfig::from_json_str("not json");
        assert!(matches!(result, Err(Error::Json(_))));
    }

    #[test]
    fn test_from_json_file_reports_missing_file() {
        let result = PersistenceConfig::from_json_file("/nonexistent/media-persistence.json");
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
