//! [`Transport`] decorator that absorbs expired access tokens

use super::coordinator::TokenRefreshCoordinator;
use crate::transport::{HttpRequest, HttpResponse, Transport, TransportError};
use async_trait::async_trait;
use tracing::{debug, warn};

/// Default number of replays allowed after a successful refresh
pub const DEFAULT_MAX_REPLAYS: u32 = 1;

/// Signs every request with the coordinator's credential and replays it
/// once the coordinator has refreshed the token
///
/// Callers only ever see a 401 when the refresh failed or when the fresh
/// token was rejected more than `max_replays` times.
#[derive(Debug, Clone)]
pub struct AuthenticatedTransport<T> {
    inner: T,
    coordinator: TokenRefreshCoordinator,
    max_replays: u32,
}

impl<T: Transport> AuthenticatedTransport<T> {
    pub fn new(inner: T, coordinator: TokenRefreshCoordinator) -> Self {
        Self {
            inner,
            coordinator,
            max_replays: DEFAULT_MAX_REPLAYS,
        }
    }

    pub fn with_max_replays(mut self, max_replays: u32) -> Self {
        self.max_replays = max_replays;
        self
    }

    pub fn coordinator(&self) -> &TokenRefreshCoordinator {
        &self.coordinator
    }
}

#[async_trait]
impl<T: Transport> Transport for AuthenticatedTransport<T> {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        // Generation left behind by a failed proactive refresh
        let failed_at = match self.coordinator.refresh_if_expired().await {
            Ok(()) => None,
            Err(e) => {
                // The request still goes out; a 401 will surface the failure.
                warn!("Proactive token refresh failed: {}", e);
                Some(self.coordinator.generation())
            }
        };

        let mut replays = 0;
        loop {
            let (signed, generation) = self.coordinator.authorize(request.clone());
            let error = match self.inner.send(signed).await {
                Ok(response) => return Ok(response),
                Err(error) => error,
            };

            // Only a credential newer than the failed cycle is worth a retry
            if error.is_unauthorized() && failed_at.is_some_and(|g| generation <= g) {
                debug!("Refresh token already rejected for {}", request);
                return Err(error);
            }

            if replays >= self.max_replays
                || !self
                    .coordinator
                    .should_retry(generation, &error)
                    .await
                    .should_retry()
            {
                return Err(error);
            }

            replays += 1;
            debug!(replays, "Replaying {} with refreshed credential", request);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Credential, TokenExchange, TokenSet};
    use crate::error::{FeedError, Result};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Accepts only `Bearer good`, answers 401 otherwise
    #[derive(Default)]
    struct TokenCheckingTransport {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for TokenCheckingTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            let auth = request.header_value("authorization").unwrap_or_default().to_string();
            self.seen.lock().unwrap().push(auth.clone());
            match auth.as_str() {
                "Bearer good" => Ok(HttpResponse::new(200, "ok")),
                _ => Err(TransportError::from_status(401, "expired")),
            }
        }
    }

    struct FixedExchange {
        token: &'static str,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TokenExchange for FixedExchange {
        async fn exchange(&self, _refresh_token: &str) -> Result<TokenSet> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.token.is_empty() {
                return Err(FeedError::refresh_failed("revoked"));
            }
            Ok(TokenSet {
                access_token: self.token.to_string(),
                refresh_token: None,
                expires_at: None,
            })
        }
    }

    fn transport(
        new_token: &'static str,
    ) -> (
        AuthenticatedTransport<Arc<TokenCheckingTransport>>,
        Arc<TokenCheckingTransport>,
        Arc<AtomicUsize>,
    ) {
        let calls = Arc::new(AtomicUsize::new(0));
        let coordinator = TokenRefreshCoordinator::new(
            Credential::new("stale", "refresh"),
            FixedExchange {
                token: new_token,
                calls: calls.clone(),
            },
        );
        let inner = Arc::new(TokenCheckingTransport::default());
        (
            AuthenticatedTransport::new(inner.clone(), coordinator),
            inner,
            calls,
        )
    }

    #[tokio::test]
    async fn test_401_is_absorbed() {
        let (transport, inner, calls) = transport("good");

        let response = transport.send(HttpRequest::get("https://x/me")).await.unwrap();

        assert_eq!(response.body, "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            *inner.seen.lock().unwrap(),
            vec!["Bearer stale".to_string(), "Bearer good".to_string()]
        );
    }

    #[tokio::test]
    async fn test_refresh_failure_surfaces_401() {
        let (transport, inner, calls) = transport("");

        let err = transport.send(HttpRequest::get("https://x/me")).await.unwrap_err();

        assert!(err.is_unauthorized());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(inner.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_expired_token_with_revoked_refresh_token_exchanges_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let coordinator = TokenRefreshCoordinator::new(
            Credential::new("stale", "revoked")
                .with_expiry(chrono::Utc::now() - chrono::Duration::seconds(10)),
            FixedExchange {
                token: "",
                calls: calls.clone(),
            },
        );
        let inner = Arc::new(TokenCheckingTransport::default());
        let transport = AuthenticatedTransport::new(inner.clone(), coordinator.clone());

        let err = transport.send(HttpRequest::get("https://x/me")).await.unwrap_err();

        assert!(err.is_unauthorized());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*inner.seen.lock().unwrap(), vec!["Bearer stale".to_string()]);
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn test_replays_are_bounded() {
        let (transport, inner, calls) = transport("still-bad");

        let err = transport.send(HttpRequest::get("https://x/me")).await.unwrap_err();

        assert!(err.is_unauthorized());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(inner.seen.lock().unwrap().len(), 2);
    }
}
