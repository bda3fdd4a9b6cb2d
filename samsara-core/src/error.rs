//! Error types for samsara-core

use thiserror::Error;

/// Main error type for the samsara-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Client configuration is unusable
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Event failed schema validation
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// Unsupported argument supplied at runtime (e.g. unknown compression mode)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Connection failure, timeout or request construction error
    #[error("transport error: {0}")]
    Transport(String),

    /// Ingestion API answered with a non-2xx status
    #[error("ingestion API rejected batch ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for samsara-core
pub type Result<T> = std::result::Result<T, Error>;
