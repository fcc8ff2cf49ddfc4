//! Error types for ussd-handlers

use thiserror::Error;

/// Account service error
#[derive(Debug, Error)]
pub enum AccountServiceError {
    /// Request never got a response
    #[error("network error: {0}")]
    Network(String),

    /// The service answered with a failure status or `ok: false`
    #[error("api error: {0}")]
    Api(String),

    /// The response body did not have the expected shape
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AccountServiceError>;
