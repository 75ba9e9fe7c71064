//! XOAUTH2 SASL mechanism for IMAP
//!
//! Implements the XOAUTH2 initial client response as documented at:
//! https://developers.google.com/workspace/gmail/imap/xoauth2-protocol

use base64::prelude::*;
use std::fmt;

/// Bearer credential for XOAUTH2 authentication
#[derive(Clone)]
pub struct XOAuth2Token {
    /// Login name
    user: String,
    /// OAuth2 access token
    access_token: String,
}

impl XOAuth2Token {
    /// Create a new XOAUTH2 token
    pub fn new(user: &str, access_token: &str) -> Self {
        Self {
            user: user.to_string(),
            access_token: access_token.to_string(),
        }
    }

    /// Generate the XOAUTH2 authentication string
    ///
    /// Format: "user={user}\x01auth=Bearer {token}\x01\x01"
    pub fn auth_string(&self) -> String {
        format!(
            "user={}\x01auth=Bearer {}\x01\x01",
            self.user, self.access_token
        )
    }

    /// Generate the base64-encoded XOAUTH2 authentication string
    ///
    /// This is the exact initial response a server expects on the wire.
    pub fn auth_string_base64(&self) -> String {
        BASE64_STANDARD.encode(self.auth_string())
    }
}

impl fmt::Debug for XOAuth2Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XOAuth2Token")
            .field("user", &self.user)
            .field("access_token", &"<redacted>")
            .finish()
    }
}
