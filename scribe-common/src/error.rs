//! Common error types for Scribe

use thiserror::Error;

/// Common result type for Scribe operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the Scribe relay
#[derive(Error, Debug)]
pub enum Error {
    /// Credential could not be obtained from the token endpoint
    #[error("Auth error: {0}")]
    Auth(String),

    /// Transport-level failure on the streaming connection
    #[error("Connection error: {0}")]
    Connection(String),

    /// Downstream API signalled its request ceiling was exceeded
    #[error("Throttled by downstream API: {0}")]
    Throttled(String),

    /// Malformed or incomplete event payload
    #[error("Validation error: {0}")]
    Validation(String),

    /// Every extraction strategy failed
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Downstream write failed after retries were exhausted
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// HTTP client error (wraps reqwest::Error)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the dispatcher should retry this failure after a delay.
    ///
    /// Covers the explicit throttle signal and request timeouts, which
    /// the downstream API produces under the same load conditions.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Throttled(_) => true,
            Error::Http(e) => e.is_timeout(),
            _ => false,
        }
    }
}
