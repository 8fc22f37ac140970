//! OAuth credential pair

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Keeps a short prefix of a token for log output
pub fn mask_token(token: &str) -> String {
    let prefix: String = token.chars().take(6).collect();
    if prefix.len() < token.len() {
        format!("{}…", prefix)
    } else {
        "…".to_string()
    }
}

/// Access/refresh token pair owned by a [`TokenRefreshCoordinator`](super::TokenRefreshCoordinator)
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token expiry, when the provider reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// True when the access token expires within `lead` from now
    ///
    /// A credential without a known expiry is never considered expired;
    /// the provider's 401 is then the only signal.
    pub fn is_expired(&self, lead: Duration) -> bool {
        self.is_expired_at(Utc::now(), lead)
    }

    fn is_expired_at(&self, now: DateTime<Utc>, lead: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => now + lead >= expires_at,
            None => false,
        }
    }

    /// Applies the result of a token exchange
    ///
    /// Providers that do not rotate refresh tokens omit it from the
    /// response; the current one is kept in that case.
    pub(crate) fn apply(&mut self, tokens: TokenSet) {
        self.access_token = tokens.access_token;
        if let Some(refresh_token) = tokens.refresh_token.filter(|t| !t.is_empty()) {
            self.refresh_token = refresh_token;
        }
        self.expires_at = tokens.expires_at;
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &mask_token(&self.access_token))
            .field("refresh_token", &mask_token(&self.refresh_token))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Tokens returned by the token-exchange endpoint
#[derive(Clone, PartialEq, Eq)]
pub struct TokenSet {
    pub access_token: String,
    /// `None` when the provider kept the previous refresh token
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &mask_token(&self.access_token))
            .field(
                "refresh_token",
                &self.refresh_token.as_deref().map(mask_token),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
