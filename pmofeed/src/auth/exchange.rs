//! OAuth token endpoint (`refresh_token` grant)

use super::credential::{mask_token, TokenSet};
use crate::error::{FeedError, Result};
use crate::http::ReqwestTransport;
use crate::transport::{HttpRequest, Transport, TransportError};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::Value;
use tracing::debug;

/// Produces a new token pair from the current refresh token
///
/// Called at most once per refresh cycle by the coordinator.
#[async_trait]
pub trait TokenExchange: Send + Sync + 'static {
    async fn exchange(&self, refresh_token: &str) -> Result<TokenSet>;
}

/// Standard OAuth 2.0 refresh through a token endpoint
///
/// # Example
///
/// ```no_run
/// use pmofeed::{OAuth2TokenExchange, TokenExchange};
///
/// #[tokio::main]
/// async fn main() -> pmofeed::Result<()> {
///     let exchange = OAuth2TokenExchange::new(
///         "https://accounts.spotify.com/api/token",
///         "my-client-id",
///     )?
///     .with_client_secret("my-client-secret");
///
///     let tokens = exchange.exchange("stored-refresh-token").await?;
///     println!("expires at {:?}", tokens.expires_at);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct OAuth2TokenExchange<T = ReqwestTransport> {
    transport: T,
    token_url: String,
    client_id: String,
    client_secret: Option<String>,
}

impl OAuth2TokenExchange<ReqwestTransport> {
    pub fn new(token_url: impl Into<String>, client_id: impl Into<String>) -> Result<Self> {
        Ok(Self::with_transport(
            ReqwestTransport::new()?,
            token_url,
            client_id,
        ))
    }
}

impl<T: Transport> OAuth2TokenExchange<T> {
    /// Uses `transport` to reach the token endpoint
    ///
    /// The transport must not be an `AuthenticatedTransport`: the token
    /// endpoint authenticates with the client credentials, not the bearer.
    pub fn with_transport(
        transport: T,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: None,
        }
    }

    pub fn with_client_secret(mut self, client_secret: impl Into<String>) -> Self {
        let secret = client_secret.into();
        self.client_secret = Some(secret).filter(|s| !s.trim().is_empty());
        self
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    fn request(&self, refresh_token: &str) -> HttpRequest {
        let mut form = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.trim().to_string()),
            ("client_id", self.client_id.trim().to_string()),
        ];
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.trim().to_string()));
        }
        HttpRequest::post_form(self.token_url.trim(), form).header("Accept", "application/json")
    }
}

#[async_trait]
impl<T: Transport + 'static> TokenExchange for OAuth2TokenExchange<T> {
    async fn exchange(&self, refresh_token: &str) -> Result<TokenSet> {
        debug!(
            refresh_token = %mask_token(refresh_token),
            "Requesting new access token from {}", self.token_url
        );

        let response = self
            .transport
            .send(self.request(refresh_token))
            .await
            .map_err(|e| {
                let status = e.status();
                match e {
                    TransportError::Unauthorized { message }
                    | TransportError::Status { message, .. } => {
                        FeedError::refresh_failed(describe_oauth_error(status, &message))
                    }
                    other => FeedError::refresh_failed(other.to_string()),
                }
            })?;

        parse_token_response(&response.body)
    }
}

/// Decodes a token endpoint JSON response
pub fn parse_token_response(body: &str) -> Result<TokenSet> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| FeedError::refresh_failed(format!("Invalid token response: {}", e)))?;

    let access_token = string_field(&value, "access_token")
        .ok_or_else(|| FeedError::refresh_failed("Token response missing access_token"))?;
    let refresh_token = string_field(&value, "refresh_token");

    let expires_at = value
        .get("expires_in")
        .and_then(parse_i64_lossy)
        .filter(|secs| *secs > 0)
        .map(|secs| Utc::now() + Duration::seconds(secs));

    Ok(TokenSet {
        access_token,
        refresh_token,
        expires_at,
    })
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_i64_lossy(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn describe_oauth_error(status: Option<u16>, body: &str) -> String {
    let mut msg = match status {
        Some(status) => format!("Token endpoint returned status {}", status),
        None => "Token endpoint failed".to_string(),
    };
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(code) = string_field(&value, "error") {
            msg.push_str(": ");
            msg.push_str(&code);
        }
        if let Some(detail) = string_field(&value, "error_description") {
            msg.push_str(" (");
            msg.push_str(&detail.chars().take(200).collect::<String>());
            msg.push(')');
        }
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[test]
    fn test_parse_expires_in_as_string() {
        let tokens =
            parse_token_response(r#"{"access_token":"a","expires_in":"3600"}"#).unwrap();
        assert_eq!(tokens.access_token, "a");
        assert!(tokens.refresh_token.is_none());
        assert!(tokens.expires_at.unwrap() > Utc::now() + Duration::seconds(3500));
    }

    #[test]
    fn test_parse_missing_access_token() {
        let err = parse_token_response(r#"{"refresh_token":"r"}"#).unwrap_err();
        assert!(matches!(err, FeedError::RefreshFailed(_)));
    }

    #[tokio::test]
    async fn test_exchange_posts_refresh_grant() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
                Matcher::UrlEncoded("refresh_token".into(), "old-refresh".into()),
                Matcher::UrlEncoded("client_id".into(), "client".into()),
                Matcher::UrlEncoded("client_secret".into(), "s3cret".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"fresh","refresh_token":"rotated","expires_in":3600}"#)
            .create_async()
            .await;

        let exchange = OAuth2TokenExchange::new(format!("{}/token", server.url()), "client")
            .unwrap()
            .with_client_secret("s3cret");
        let tokens = exchange.exchange("old-refresh").await.unwrap();

        assert_eq!(tokens.access_token, "fresh");
        assert_eq!(tokens.refresh_token.as_deref(), Some("rotated"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_refresh_token() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant","error_description":"Refresh token revoked"}"#)
            .create_async()
            .await;

        let exchange =
            OAuth2TokenExchange::new(format!("{}/token", server.url()), "client").unwrap();
        let err = exchange.exchange("revoked").await.unwrap_err();

        match err {
            FeedError::RefreshFailed(msg) => {
                assert!(msg.contains("400"));
                assert!(msg.contains("invalid_grant"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
