//! Error types for IMAP operations

use thiserror::Error;

/// Result type for IMAP operations
pub type ImapResult<T> = Result<T, ImapError>;

/// Errors that can occur during IMAP operations
#[derive(Debug, Error)]
pub enum ImapError {
    /// Connection failed
    #[error("Failed to connect to IMAP server: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("IMAP authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Server rejected a command
    #[error("IMAP server error: {0}")]
    ServerError(String),

    /// Folder could not be opened
    #[error("Folder not found: {0}")]
    FolderNotFound(String),

    /// Parse error
    #[error("Failed to parse IMAP response: {0}")]
    ParseError(String),

    /// TLS error
    #[error("TLS error: {0}")]
    TlsError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ImapError {
    /// Errors raised while establishing the session rather than using it
    pub fn is_connect(&self) -> bool {
        matches!(self, ImapError::ConnectionFailed(_) | ImapError::TlsError(_))
    }
}

impl From<async_imap::error::Error> for ImapError {
    fn from(e: async_imap::error::Error) -> Self {
        match e {
            async_imap::error::Error::Io(io) => ImapError::IoError(io),
            async_imap::error::Error::Parse(p) => ImapError::ParseError(p.to_string()),
            other => ImapError::ServerError(other.to_string()),
        }
    }
}
