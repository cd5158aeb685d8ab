//! Error types for Datamill
//!
//! This module defines all error types surfaced to callers of the pipeline.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Failures inside user-supplied transformer or label functions are NOT
//! part of [`Error`]: they are reported as [`FunctionError`] and recorded in
//! the owning test's persistent log instead of aborting processing.

use crate::json::{LimitError, PathParseError};
use crate::types::RunId;
use thiserror::Error;

/// Result type alias for Datamill operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the Datamill pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Caller supplied something unusable (malformed JSON payload, bad parameter)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No test with this id or name
    #[error("Test not found: {0}")]
    TestNotFound(String),

    /// No run with this id
    #[error("Run not found: {0}")]
    RunNotFound(RunId),

    /// No schema registered under this URI or id
    #[error("Schema not found: {0}")]
    SchemaNotFound(String),

    /// Path expression could not be parsed
    #[error("Invalid path expression: {0}")]
    PathParse(#[from] PathParseError),

    /// Document exceeds one of the configured limits
    #[error("Document limit exceeded: {0}")]
    Limit(#[from] LimitError),

    /// Configuration could not be read or is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Worker queue is at capacity or shut down
    #[error("Worker queue is full or shut down")]
    Backpressure,

    /// Unexpected internal failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for [`Error::InvalidInput`]
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Shorthand for [`Error::Internal`]
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// True for errors caused by the caller's input rather than system state
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidInput(_) | Error::PathParse(_) | Error::Limit(_) | Error::TestNotFound(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::InvalidInput(format!("payload is not valid JSON: {}", e))
    }
}

/// Failure raised by a transformer or label function
///
/// Never returned to the caller of an ingest operation; the engine records
/// it in the persistent log of the owning test and continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct FunctionError(pub String);

impl FunctionError {
    /// Create a new function error with the given message
    pub fn new(msg: impl Into<String>) -> Self {
        FunctionError(msg.into())
    }
}
