//! Notification Sink
//!
//! The core reports save outcomes as `(level, message)` or
//! `(level, message, cause)` entries. Hosts decide where those end up
//! (status bar, log file, OS logging).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{self, Write};

use crate::error::Result;

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Structured notification entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Log level
    pub level: LogLevel,
    /// Timestamp
    pub timestamp: DateTime<Utc>,
    /// Target module/component
    pub target: String,
    /// Human-readable message
    pub message: String,
    /// Rendered error chain when the entry reports a failure
    pub cause: Option<String>,
    /// Structured fields
    pub fields: HashMap<String, String>,
}

impl LogEntry {
    pub fn new(level: LogLevel, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            timestamp: Utc::now(),
            target: target.into(),
            message: message.into(),
            cause: None,
            fields: HashMap::new(),
        }
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// Notification sink trait
///
/// # Example
///
/// ```ignore
/// use bridge_traits::notification::NotificationSink;
///
/// async fn report(sink: &dyn NotificationSink, err: &dyn std::error::Error) {
///     sink.error("core", "Saving playlist failed", &err.to_string()).await.ok();
/// }
/// ```
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    /// Forward an entry to the host
    async fn notify(&self, entry: LogEntry) -> Result<()>;

    /// Report an informational message
    async fn info(&self, target: &str, message: &str) -> Result<()> {
        self.notify(LogEntry::new(LogLevel::Info, target, message)).await
    }

    /// Report a failure together with its cause
    async fn error(&self, target: &str, message: &str, cause: &str) -> Result<()> {
        self.notify(LogEntry::new(LogLevel::Error, target, message).with_cause(cause)).await
    }

    /// Entries below this level are dropped at the source
    fn min_level(&self) -> LogLevel {
        LogLevel::Info
    }
}

/// Console sink for development
#[derive(Debug, Clone)]
pub struct ConsoleSink {
    pub min_level: LogLevel,
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
        }
    }
}

#[async_trait::async_trait]
impl NotificationSink for ConsoleSink {
    async fn notify(&self, entry: LogEntry) -> Result<()> {
        if entry.level >= self.min_level {
            let level_str = match entry.level {
                LogLevel::Trace => "TRACE",
                LogLevel::Debug => "DEBUG",
                LogLevel::Info => "INFO",
                LogLevel::Warn => "WARN",
                LogLevel::Error => "ERROR",
            };

            let mut out = io::stdout().lock();
            writeln!(
                out,
                "[{}] {} {}: {}",
                entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
                level_str,
                entry.target,
                entry.message
            )?;

            if let Some(cause) = &entry.cause {
                writeln!(out, "  Caused by: {}", cause)?;
            }
        }
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        self.min_level
    }
}
