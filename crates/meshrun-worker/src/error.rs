//! Error types for the coordinator client.

use thiserror::Error;

/// Errors that can occur when talking to the coordinator.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level failure (connection, timeout, body decoding).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The coordinator answered with a non-success status.
    #[error("coordinator returned {status}: {message}")]
    Api { status: u16, message: String },

    /// Reading a local artifact failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
