//! OAuth2 refresh-token exchange
//!
//! Interactive authorization happens elsewhere; this layer only trades a
//! long-lived refresh token for a short-lived access token.

use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use oauth2::{
    basic::BasicClient, reqwest::async_http_client, AuthUrl, ClientId, RefreshToken,
    RequestTokenError, Scope, TokenResponse, TokenUrl,
};
use tracing::{debug, info, warn};

/// OAuth2 provider configuration
#[derive(Debug, Clone)]
pub struct OAuth2Config {
    /// Authorization endpoint URL
    pub auth_url: String,
    /// Token endpoint URL
    pub token_url: String,
    /// Scopes sent with the refresh request (none when empty)
    pub scopes: Vec<String>,
}

/// OAuth2 provider presets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OAuth2Provider {
    /// Microsoft identity platform (Outlook / Office 365)
    #[default]
    Microsoft,
    /// Google (Gmail)
    Gmail,
}

impl OAuth2Provider {
    /// Get default configuration for a provider
    pub fn config(&self) -> OAuth2Config {
        match self {
            OAuth2Provider::Microsoft => crate::microsoft::oauth2_config(),
            OAuth2Provider::Gmail => crate::gmail::oauth2_config(),
        }
    }
}

/// Exchanges a refresh credential for an access token
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Return a fresh access token
    ///
    /// `token_url` overrides the provider's token endpoint when present.
    async fn access_token(
        &self,
        client_id: &str,
        refresh_token: &str,
        token_url: Option<&str>,
    ) -> AuthResult<String>;
}

/// Token refresher talking to a real identity provider
#[derive(Debug, Clone)]
pub struct OAuth2Refresher {
    config: OAuth2Config,
}

impl OAuth2Refresher {
    /// Create a refresher for a provider preset
    pub fn new(provider: OAuth2Provider) -> Self {
        Self {
            config: provider.config(),
        }
    }

    fn client(&self, client_id: &str, token_url: &str) -> AuthResult<BasicClient> {
        let auth_url = AuthUrl::new(self.config.auth_url.clone())
            .map_err(|e| AuthError::InvalidConfig(format!("Invalid auth URL: {}", e)))?;
        let token_url = TokenUrl::new(token_url.to_string())
            .map_err(|e| AuthError::InvalidConfig(format!("Invalid token URL: {}", e)))?;

        // No client secret: the client id travels in the form body
        Ok(BasicClient::new(
            ClientId::new(client_id.to_string()),
            None,
            auth_url,
            Some(token_url),
        ))
    }
}

impl Default for OAuth2Refresher {
    fn default() -> Self {
        Self::new(OAuth2Provider::default())
    }
}

#[async_trait]
impl TokenRefresher for OAuth2Refresher {
    async fn access_token(
        &self,
        client_id: &str,
        refresh_token: &str,
        token_url: Option<&str>,
    ) -> AuthResult<String> {
        let token_url = token_url.unwrap_or(self.config.token_url.as_str());
        let client = self.client(client_id, token_url)?;

        debug!("Refreshing OAuth2 access token via {}", token_url);

        let refresh_token = RefreshToken::new(refresh_token.to_string());
        let mut request = client.exchange_refresh_token(&refresh_token);
        for scope in &self.config.scopes {
            request = request.add_scope(Scope::new(scope.clone()));
        }

        let response = request
            .request_async(async_http_client)
            .await
            .map_err(|e| match e {
                RequestTokenError::ServerResponse(resp) => {
                    let kind: &str = resp.error().as_ref();
                    let detail = match resp.error_description() {
                        Some(description) => format!("{}: {}", kind, description),
                        None => kind.to_string(),
                    };
                    warn!("Identity provider rejected refresh token: {}", detail);
                    AuthError::TokenRefreshFailed(detail)
                }
                RequestTokenError::Request(err) => AuthError::NetworkError(err.to_string()),
                RequestTokenError::Parse(err, body) => AuthError::TokenRefreshFailed(format!(
                    "{}: {}",
                    err,
                    String::from_utf8_lossy(&body)
                )),
                RequestTokenError::Other(msg) => AuthError::TokenRefreshFailed(msg),
            })?;

        info!("OAuth2 access token refreshed");
        Ok(response.access_token().secret().clone())
    }
}
