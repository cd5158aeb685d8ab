//! Pipeline configuration via `datamill.toml`
//!
//! A deployment keeps one config file next to its data. On first start a
//! default `datamill.toml` is written; to change settings, edit the file and
//! restart.

use datamill_core::{Error, LogLevel, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Config file name.
pub const CONFIG_FILE_NAME: &str = "datamill.toml";

/// Pipeline configuration loaded from `datamill.toml`.
///
/// # Example
///
/// ```toml
/// worker_threads = 4
/// max_queue_depth = 65536
/// max_document_bytes = 16777216
/// log_level = "debug"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatamillConfig {
    /// Worker threads processing runs.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    /// Maximum queued units of work before uploads are rejected.
    #[serde(default = "default_max_queue_depth")]
    pub max_queue_depth: usize,
    /// Largest accepted run payload, in bytes.
    #[serde(default = "default_max_document_bytes")]
    pub max_document_bytes: usize,
    /// Minimum persistent log level kept: `"debug"`, `"info"`, `"warn"` or `"error"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_worker_threads() -> usize {
    4
}

fn default_max_queue_depth() -> usize {
    65_536
}

fn default_max_document_bytes() -> usize {
    datamill_core::MAX_DOCUMENT_SIZE
}

fn default_log_level() -> String {
    "debug".to_string()
}

impl Default for DatamillConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            max_queue_depth: default_max_queue_depth(),
            max_document_bytes: default_max_document_bytes(),
            log_level: default_log_level(),
        }
    }
}

impl DatamillConfig {
    /// Parse the log level string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a known level.
    pub fn min_log_level(&self) -> Result<LogLevel> {
        self.log_level.parse().map_err(|_| {
            Error::Config(format!(
                "Invalid log_level '{}' in datamill.toml. Expected \"debug\", \"info\", \"warn\" or \"error\".",
                self.log_level
            ))
        })
    }

    /// Check every value.
    pub fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 {
            return Err(Error::Config("worker_threads must be at least 1".into()));
        }
        if self.max_queue_depth == 0 {
            return Err(Error::Config("max_queue_depth must be at least 1".into()));
        }
        if self.max_document_bytes == 0 {
            return Err(Error::Config("max_document_bytes must be at least 1".into()));
        }
        self.min_log_level()?;
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Datamill pipeline configuration
#
# Worker threads processing uploaded runs and recalculations (default: 4)
worker_threads = 4

# Queued units of work before uploads are rejected (default: 65536)
max_queue_depth = 65536

# Largest accepted run payload in bytes (default: 16 MiB)
max_document_bytes = 16777216

# Minimum level kept in the per-test persistent log:
#   "debug" (default), "info", "warn" or "error"
log_level = "debug"
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: DatamillConfig = toml::from_str(&content).map_err(|e| {
            Error::Config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        tracing::debug!(target: "datamill::config", path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::Config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
            tracing::info!(target: "datamill::config", path = %path.display(), "Wrote default configuration");
        }
        Ok(())
    }

    /// Write the default file if missing, then load it.
    pub fn load_or_init(path: &Path) -> Result<Self> {
        Self::write_default_if_missing(path)?;
        Self::from_file(path)
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::Config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
