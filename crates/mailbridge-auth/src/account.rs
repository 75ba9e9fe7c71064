//! Account and server configuration
//!
//! These values are injected per request by the caller; nothing here is
//! persisted.

use serde::{Deserialize, Serialize};
use std::fmt;

fn default_port() -> u16 {
    993
}

fn default_tls() -> bool {
    true
}

/// Mailbox server endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerTarget {
    /// Server hostname
    pub host: String,
    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Connect with implicit TLS
    #[serde(rename = "tls", default = "default_tls")]
    pub use_tls: bool,
}

impl ServerTarget {
    pub fn new(host: impl Into<String>, port: u16, use_tls: bool) -> Self {
        Self {
            host: host.into(),
            port,
            use_tls,
        }
    }
}

/// Secret material for one account
///
/// Either a static password or an OAuth2 refresh credential that is exchanged
/// for a fresh access token on every operation.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum AccountCredential {
    /// OAuth2 refresh credential
    OAuth2 {
        refresh_token: String,
        client_id: String,
        /// Overrides the provider token endpoint
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token_url: Option<String>,
    },
    /// Static secret (password or app password)
    Password {
        #[serde(default)]
        password: Option<String>,
    },
}

impl fmt::Debug for AccountCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountCredential::OAuth2 {
                client_id,
                token_url,
                ..
            } => f
                .debug_struct("OAuth2")
                .field("client_id", client_id)
                .field("token_url", token_url)
                .field("refresh_token", &"<redacted>")
                .finish(),
            AccountCredential::Password { password } => f
                .debug_struct("Password")
                .field("password", &password.as_ref().map(|_| "<redacted>"))
                .finish(),
        }
    }
}

/// Connection configuration for one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Login name, usually the email address
    pub username: String,
    /// Server endpoint
    #[serde(flatten)]
    pub server: ServerTarget,
    /// Password or OAuth2 refresh credential
    #[serde(flatten)]
    pub credential: AccountCredential,
}

impl AccountConfig {
    /// Account authenticating with a static password
    pub fn with_password(
        username: impl Into<String>,
        server: ServerTarget,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            server,
            credential: AccountCredential::Password {
                password: Some(password.into()),
            },
        }
    }

    /// Account authenticating with an OAuth2 refresh token
    pub fn with_oauth2(
        username: impl Into<String>,
        server: ServerTarget,
        refresh_token: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            server,
            credential: AccountCredential::OAuth2 {
                refresh_token: refresh_token.into(),
                client_id: client_id.into(),
                token_url: None,
            },
        }
    }
}
