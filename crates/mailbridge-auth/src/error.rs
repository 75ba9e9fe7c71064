//! Error types for the auth module

use thiserror::Error;

/// Result type for auth operations
pub type AuthResult<T> = Result<T, AuthError>;

/// Errors that can occur while resolving credentials
#[derive(Debug, Error)]
pub enum AuthError {
    /// Account configuration is missing a field or carries an invalid value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The identity provider rejected the refresh token
    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    /// The identity provider could not be reached
    #[error("Network error: {0}")]
    NetworkError(String),
}

impl AuthError {
    /// Whether the failure comes from bad input rather than the provider
    pub fn is_config(&self) -> bool {
        matches!(self, AuthError::InvalidConfig(_))
    }
}
