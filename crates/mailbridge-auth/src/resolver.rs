//! Turns account configuration into ready-to-authenticate parameters

use crate::{AccountConfig, AccountCredential, AuthError, AuthResult, ServerTarget, TokenRefresher, XOAuth2Token};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// How a session authenticates once connected
#[derive(Clone)]
pub enum ConnectAuth {
    /// LOGIN with a static secret
    Password(String),
    /// AUTHENTICATE XOAUTH2 with a freshly refreshed bearer token
    XOAuth2(XOAuth2Token),
}

impl fmt::Debug for ConnectAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectAuth::Password(_) => f.write_str("Password(<redacted>)"),
            ConnectAuth::XOAuth2(token) => f.debug_tuple("XOAuth2").field(token).finish(),
        }
    }
}

/// Everything needed to open and authenticate one session
#[derive(Debug, Clone)]
pub struct ConnectParams {
    /// Server endpoint
    pub target: ServerTarget,
    /// Login name
    pub username: String,
    /// Authentication mechanism and secret
    pub auth: ConnectAuth,
}

impl ConnectParams {
    /// Pool key grouping sessions of the same login on the same endpoint
    pub fn session_key(&self) -> String {
        format!("{}@{}:{}", self.username, self.target.host, self.target.port)
    }
}

/// Resolves account configuration into [`ConnectParams`]
///
/// Tokens are never cached: every call refreshes the OAuth2 access token.
#[derive(Clone)]
pub struct CredentialResolver {
    refresher: Arc<dyn TokenRefresher>,
}

impl CredentialResolver {
    pub fn new(refresher: Arc<dyn TokenRefresher>) -> Self {
        Self { refresher }
    }

    /// Resolve a configuration, refreshing OAuth2 tokens as needed
    pub async fn resolve(&self, config: &AccountConfig) -> AuthResult<ConnectParams> {
        if config.username.trim().is_empty() {
            return Err(AuthError::InvalidConfig("username is required".to_string()));
        }
        if config.server.host.trim().is_empty() {
            return Err(AuthError::InvalidConfig("host is required".to_string()));
        }
        if config.server.port == 0 {
            return Err(AuthError::InvalidConfig("port must be non-zero".to_string()));
        }

        let auth = match &config.credential {
            AccountCredential::Password { password } => match password {
                Some(secret) if !secret.is_empty() => ConnectAuth::Password(secret.clone()),
                _ => {
                    return Err(AuthError::InvalidConfig(
                        "password is required".to_string(),
                    ))
                }
            },
            AccountCredential::OAuth2 {
                refresh_token,
                client_id,
                token_url,
            } => {
                if refresh_token.is_empty() || client_id.is_empty() {
                    return Err(AuthError::InvalidConfig(
                        "refreshToken and clientId are required".to_string(),
                    ));
                }
                let access_token = self
                    .refresher
                    .access_token(client_id, refresh_token, token_url.as_deref())
                    .await?;
                ConnectAuth::XOAuth2(XOAuth2Token::new(&config.username, &access_token))
            }
        };

        debug!(
            "Resolved credentials for {}@{}:{}",
            config.username, config.server.host, config.server.port
        );

        Ok(ConnectParams {
            target: config.server.clone(),
            username: config.username.clone(),
            auth,
        })
    }
}

impl fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialResolver").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticRefresher {
        calls: AtomicUsize,
        result: Result<&'static str, &'static str>,
    }

    impl StaticRefresher {
        fn ok(token: &'static str) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                result: Ok(token),
            })
        }

        fn failing(message: &'static str) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                result: Err(message),
            })
        }
    }

    #[async_trait]
    impl TokenRefresher for StaticRefresher {
        async fn access_token(
            &self,
            _client_id: &str,
            _refresh_token: &str,
            _token_url: Option<&str>,
        ) -> AuthResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result
                .map(str::to_string)
                .map_err(|e| AuthError::TokenRefreshFailed(e.to_string()))
        }
    }

    fn server() -> ServerTarget {
        ServerTarget::new("outlook.office365.com", 993, true)
    }

    #[tokio::test]
    async fn test_password_passes_through() {
        let resolver = CredentialResolver::new(StaticRefresher::ok("unused"));
        let config = AccountConfig::with_password("me@example.com", server(), "hunter2");

        let params = resolver.resolve(&config).await.unwrap();
        assert!(matches!(params.auth, ConnectAuth::Password(ref s) if s == "hunter2"));
        assert_eq!(params.session_key(), "me@example.com@outlook.office365.com:993");
    }

    #[tokio::test]
    async fn test_missing_password_is_config_error() {
        let resolver = CredentialResolver::new(StaticRefresher::ok("unused"));
        let mut config = AccountConfig::with_password("me@example.com", server(), "x");
        config.credential = AccountCredential::Password { password: None };

        let err = resolver.resolve(&config).await.unwrap_err();
        assert!(err.is_config());
    }

    #[tokio::test]
    async fn test_oauth2_builds_bearer_string_every_call() {
        let refresher = StaticRefresher::ok("access-1");
        let resolver = CredentialResolver::new(refresher.clone());
        let config = AccountConfig::with_oauth2("me@outlook.com", server(), "rt", "cid");

        let params = resolver.resolve(&config).await.unwrap();
        let expected = XOAuth2Token::new("me@outlook.com", "access-1").auth_string_base64();
        assert!(matches!(
            params.auth,
            ConnectAuth::XOAuth2(ref token) if token.auth_string_base64() == expected
        ));

        resolver.resolve(&config).await.unwrap();
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_oauth2_refresh_failure_propagates_provider_text() {
        let resolver = CredentialResolver::new(StaticRefresher::failing("invalid_grant: AADSTS70008"));
        let config = AccountConfig::with_oauth2("me@outlook.com", server(), "rt", "cid");

        let err = resolver.resolve(&config).await.unwrap_err();
        assert!(!err.is_config());
        assert!(err.to_string().contains("AADSTS70008"));
    }

    #[tokio::test]
    async fn test_empty_host_rejected() {
        let resolver = CredentialResolver::new(StaticRefresher::ok("unused"));
        let config =
            AccountConfig::with_password("me", ServerTarget::new("", 993, true), "hunter2");
        assert!(resolver.resolve(&config).await.unwrap_err().is_config());
    }
}
