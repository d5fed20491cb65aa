//! Error types for the core library.

use crate::address::AddressError;
use crate::template::TemplateError;
use crate::transport::TransportError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while preparing or running a mail merge.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file could not be read.
    #[error("Cannot read configuration {}: {source}", path.display())]
    ConfigRead {
        /// Configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("Cannot parse configuration {}: {message}", path.display())]
    ConfigParse {
        /// Configuration file.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// CC or BCC list in the configuration is not a valid address list.
    #[error("Invalid {field} list: {source}")]
    AddressList {
        /// Which list (`from`, `CC`, `BCC`, `test address`).
        field: &'static str,
        /// Parse failure.
        source: AddressError,
    },

    /// Sent ledger could not be read or written.
    #[error("Sent ledger {}: {source}", path.display())]
    Ledger {
        /// Ledger file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Recipient data could not be loaded.
    #[error("Data file {}: {message}", path.display())]
    Data {
        /// Data file.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// Templates could not be loaded.
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    /// Rendering a row failed.
    #[error("Row {row}: rendering failed: {source}")]
    Render {
        /// One-based data row number.
        row: usize,
        /// Template failure.
        source: TemplateError,
    },

    /// The destination field of a row is empty.
    #[error("Row {row}: destination address not found, field `{field}` is empty")]
    DestinationNotFound {
        /// One-based data row number.
        row: usize,
        /// Configured destination field.
        field: String,
    },

    /// The destination field of a row is not an address list.
    #[error("Row {row}: {source}")]
    Destination {
        /// One-based data row number.
        row: usize,
        /// Parse failure.
        source: AddressError,
    },

    /// An attachment named by a row could not be read.
    #[error("Row {row}: {source}")]
    Attachment {
        /// One-based data row number.
        row: usize,
        /// Read failure.
        source: mailmerge_mime::Error,
    },

    /// Connecting to the SMTP server failed.
    #[error("Connect to SMTP server failed: {0}")]
    Connect(#[source] TransportError),

    /// Transmitting a message failed.
    #[error("Row {row}: sending email to {destination} failed: {source}")]
    Send {
        /// One-based data row number.
        row: usize,
        /// Destination summary shown to the user.
        destination: String,
        /// Transport failure.
        source: TransportError,
    },

    /// The confirmation prompt failed.
    #[error("User confirmation failed: {0}")]
    Confirm(#[source] std::io::Error),

    /// The user cancelled the run at a confirmation prompt.
    #[error("Aborted by user")]
    Aborted,

    /// The run was cancelled (Ctrl-C).
    #[error("Cancelled")]
    Cancelled,
}

impl Error {
    /// Returns true if this error only affects the row it occurred on.
    #[must_use]
    pub fn is_continuable(&self) -> bool {
        match self {
            Self::DestinationNotFound { .. }
            | Self::Destination { .. }
            | Self::Attachment { .. } => true,
            Self::Send { source, .. } => !source.is_connection_lost(),
            _ => false,
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
