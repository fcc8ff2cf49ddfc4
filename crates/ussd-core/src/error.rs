//! Error types for ussd-core
//!
//! `NotFound` is a recoverable condition every caller handles explicitly.
//! It is never folded into `Backend`, which means the store itself failed.

use thiserror::Error;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Entry absent from the backend
    #[error("not found: {0}")]
    NotFound(String),

    /// Backend I/O or connectivity failure
    #[error("backend error: {0}")]
    Backend(String),

    /// Session state could not be loaded or persisted
    #[error("storage error: {0}")]
    Storage(String),

    /// Another request holds the session lease and the wait timed out
    #[error("session busy: {0}")]
    SessionBusy(String),

    /// The interpreter step failed
    #[error("interpreter error: {0}")]
    Interpreter(String),

    /// A flag name missing from the flag table
    #[error("unknown flag: {0}")]
    UnknownFlag(String),

    /// Malformed input data (flag table, encoded list, state blob)
    #[error("parse error: {0}")]
    Parse(String),

    /// Position outside an indexed list
    #[error("index {position} out of range for '{label}' ({len} items)")]
    IndexOutOfRange {
        /// Category label of the list
        label: String,
        /// Requested 1-based position
        position: usize,
        /// Number of items stored
        len: usize,
    },

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Writing output to the response sink failed
    #[error("output error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this is the recoverable "entry absent" condition
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
