//! Persistent per-test log
//!
//! Failures inside user functions never reach the caller of an ingest
//! operation. They are recorded here, against the owning test, where users
//! can inspect them later.

use crate::error::{Error, Result};
use crate::types::{RunId, TestId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Severity of a log entry, ordered from least to most severe
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Diagnostic detail
    #[default]
    Debug,
    /// Lifecycle information
    Info,
    /// Suspicious but handled
    Warning,
    /// A user function failed
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        };
        f.write_str(s)
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" | "trace" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other => Err(Error::invalid_input(format!("unknown log level '{}'", other))),
        }
    }
}

/// One persistent log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistentLogEntry {
    /// Owning test
    pub test_id: TestId,
    /// Run being processed, if any
    pub run_id: Option<RunId>,
    /// Severity
    pub level: LogLevel,
    /// Human-readable message
    pub message: String,
    /// When the entry was written
    pub timestamp: DateTime<Utc>,
}

impl PersistentLogEntry {
    /// Entry stamped with the current time
    pub fn new(test_id: TestId, run_id: Option<RunId>, level: LogLevel, message: impl Into<String>) -> Self {
        PersistentLogEntry {
            test_id,
            run_id,
            level,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}
