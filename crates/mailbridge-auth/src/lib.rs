//! Credential resolution for mailbridge
//!
//! Turns per-request account configuration into connect parameters:
//! 1. Password accounts pass their secret straight through
//! 2. OAuth2 accounts exchange a refresh token for a fresh access token and
//!    authenticate with XOAUTH2

mod account;
mod error;
mod oauth2;
mod resolver;
mod xoauth2;

pub use account::{AccountConfig, AccountCredential, ServerTarget};
pub use error::{AuthError, AuthResult};
pub use oauth2::{OAuth2Config, OAuth2Provider, OAuth2Refresher, TokenRefresher};
pub use resolver::{ConnectAuth, ConnectParams, CredentialResolver};
pub use xoauth2::XOAuth2Token;

/// Microsoft identity platform configuration
pub mod microsoft {
    use super::OAuth2Config;

    /// Token endpoint used for refresh-token exchange
    pub const TOKEN_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/token";

    /// Create Microsoft OAuth2 configuration
    ///
    /// Refresh requests carry no scope; the provider reuses the scopes of the
    /// original grant.
    pub fn oauth2_config() -> OAuth2Config {
        OAuth2Config {
            auth_url: "https://login.microsoftonline.com/common/oauth2/v2.0/authorize".to_string(),
            token_url: TOKEN_URL.to_string(),
            scopes: Vec::new(),
        }
    }
}

/// Gmail OAuth2 configuration
pub mod gmail {
    use super::OAuth2Config;

    /// Create Gmail OAuth2 configuration
    pub fn oauth2_config() -> OAuth2Config {
        OAuth2Config {
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            scopes: Vec::new(),
        }
    }
}
