//! Error types for corner-core

use thiserror::Error;

/// Result type alias using corner-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in corner-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP transport error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success response from a hosted service
    #[error("{service} returned HTTP {status}: {detail}")]
    Api {
        service: &'static str,
        status: u16,
        detail: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Recording not found
    #[error("Recording not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Media/object storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Operation requires a signed-in user
    #[error("Sign in required")]
    NotSignedIn,
}
