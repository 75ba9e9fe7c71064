//! Error types for the core module

use mailbridge_auth::AuthError;
use mailbridge_imap::ImapError;
use thiserror::Error;

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors surfaced by mailbox operations
#[derive(Debug, Error)]
pub enum CoreError {
    /// Missing or malformed account configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credentials rejected by the identity provider or the server
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Network or TLS failure while opening a session
    #[error("Connection error: {0}")]
    Connect(String),

    #[error("Timed out connecting to server")]
    ConnectTimeout,

    #[error("Timed out waiting for a free session")]
    AcquireTimeout,

    /// The server stopped answering mid-operation
    #[error("Timed out waiting for the server")]
    OperationTimeout,

    /// Server rejected a command or the session broke mid-operation
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Session pool is shut down")]
    PoolClosed,
}

impl CoreError {
    /// Stable tag for mapping at the request boundary
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::Config(_) => "config",
            CoreError::Auth(_) => "auth",
            CoreError::Connect(_) => "connect",
            CoreError::ConnectTimeout => "connect_timeout",
            CoreError::AcquireTimeout => "acquire_timeout",
            CoreError::OperationTimeout => "operation_timeout",
            CoreError::Protocol(_) => "protocol",
            CoreError::PoolClosed => "pool_closed",
        }
    }
}

impl From<AuthError> for CoreError {
    fn from(e: AuthError) -> Self {
        if e.is_config() {
            CoreError::Config(e.to_string())
        } else {
            CoreError::Auth(e.to_string())
        }
    }
}

impl From<ImapError> for CoreError {
    fn from(e: ImapError) -> Self {
        match e {
            ImapError::AuthenticationFailed(_) => CoreError::Auth(e.to_string()),
            e if e.is_connect() => CoreError::Connect(e.to_string()),
            e => CoreError::Protocol(e.to_string()),
        }
    }
}
