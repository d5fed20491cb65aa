//! Error types for SMTP operations.

use std::io;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TLS error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Server returned error response.
    #[error("SMTP error {code}: {message}")]
    SmtpError {
        /// Reply code (e.g., 550).
        code: u16,
        /// Error message from server.
        message: String,
    },

    /// Protocol error (unexpected response).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Transaction has no recipients.
    #[error("No recipients for mail transaction")]
    NoRecipients,

    /// Message too large for the server's advertised SIZE.
    #[error("Message exceeds size limit: {0} bytes")]
    MessageTooLarge(usize),

    /// Feature not supported by server.
    #[error("Server does not support {0}")]
    NotSupported(String),

    /// Operation did not complete in time.
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Connection was closed by the server.
    #[error("Connection closed by server")]
    ConnectionClosed,
}

impl Error {
    /// Creates an SMTP error from a reply code and message.
    #[must_use]
    pub fn smtp_error(code: u16, message: impl Into<String>) -> Self {
        Self::SmtpError {
            code,
            message: message.into(),
        }
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::SmtpError { code, .. } if *code >= 500 && *code < 600)
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::SmtpError { code, .. } if *code >= 400 && *code < 500)
    }

    /// Returns true if the connection can no longer be used after this error.
    ///
    /// Reply errors leave the session in a known state (the transaction is
    /// reset), except 421 which announces the server is closing the channel.
    #[must_use]
    pub const fn is_connection_lost(&self) -> bool {
        match self {
            Self::Io(_)
            | Self::Tls(_)
            | Self::Protocol(_)
            | Self::Timeout(_)
            | Self::ConnectionClosed => true,
            Self::SmtpError { code, .. } => *code == 421,
            Self::InvalidAddress(_)
            | Self::NoRecipients
            | Self::MessageTooLarge(_)
            | Self::NotSupported(_) => false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn reply_errors_keep_connection() {
        assert!(!Error::smtp_error(550, "no such user").is_connection_lost());
        assert!(!Error::smtp_error(452, "try later").is_connection_lost());
    }

    #[test]
    fn service_closing_loses_connection() {
        assert!(Error::smtp_error(421, "closing").is_connection_lost());
    }

    #[test]
    fn io_errors_lose_connection() {
        let err = Error::from(io::Error::new(io::ErrorKind::BrokenPipe, "pipe"));
        assert!(err.is_connection_lost());
        assert!(Error::ConnectionClosed.is_connection_lost());
    }

    #[test]
    fn classification() {
        assert!(Error::smtp_error(550, "x").is_permanent());
        assert!(Error::smtp_error(451, "x").is_transient());
        assert!(!Error::NoRecipients.is_transient());
    }
}
