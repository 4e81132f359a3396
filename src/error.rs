//! Error types for the server lifecycle core.

use thiserror::Error;

/// Main error type for all server lifecycle operations.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Another process already holds the singleton lease for this endpoint.
    ///
    /// This is an expected outcome, not a fault: it means a server is
    /// already serving the endpoint. Callers map it to
    /// [`exit_code::ALREADY_RUNNING`](crate::controller::exit_code) rather
    /// than reporting a failure.
    #[error("another server already holds endpoint `{0}`")]
    AlreadyHeld(String),

    /// I/O error during lock, pipe, or socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (lease metadata).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Client-side connection attempt did not complete within the deadline.
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(std::time::Duration),

    /// Shutdown handshake over an established connection failed.
    #[error("shutdown handshake failed: {0}")]
    Handshake(String),
}

impl ServerError {
    /// Whether this error is lease contention rather than a real fault.
    pub fn is_contention(&self) -> bool {
        matches!(self, ServerError::AlreadyHeld(_))
    }
}

/// Result type alias using ServerError.
pub type Result<T> = std::result::Result<T, ServerError>;
