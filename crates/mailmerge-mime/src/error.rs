//! Error types for MIME operations.

use std::path::PathBuf;

/// Result type alias for MIME operations.
pub type Result<T> = std::result::Result<T, Error>;

/// MIME error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid MIME header.
    #[error("Invalid MIME header: {0}")]
    InvalidHeader(String),

    /// Missing required header.
    #[error("Missing required header: {0}")]
    MissingHeader(&'static str),

    /// Attachment file could not be read.
    #[error("Cannot read attachment {}: {source}", path.display())]
    Attachment {
        /// Path of the attachment.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}
