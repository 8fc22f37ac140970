//! Everything needed to page through one provider

use crate::paging::JsonPager;
use crate::provider::Provider;
use pmofeed::{ResourceLoader, TokenRefreshCoordinator, Transport};
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// A provider endpoint together with the transport that reaches it
///
/// For OAuth providers the transport is an `AuthenticatedTransport` and
/// [`coordinator`](Self::coordinator) gives access to the shared credential
/// (to persist rotated tokens, for instance). Every loader built from the
/// same session shares that coordinator.
#[derive(Clone)]
pub struct ProviderSession {
    provider: Provider,
    url: String,
    page_size: u64,
    event_capacity: usize,
    transport: Arc<dyn Transport>,
    coordinator: Option<TokenRefreshCoordinator>,
}

impl ProviderSession {
    pub fn new(
        provider: Provider,
        url: impl Into<String>,
        page_size: u64,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            provider,
            url: url.into(),
            page_size,
            event_capacity: pmofeed::loader::DEFAULT_EVENT_CAPACITY,
            transport,
            coordinator: None,
        }
    }

    pub fn with_coordinator(mut self, coordinator: TokenRefreshCoordinator) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    /// Overrides the configured page size for this session only
    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn coordinator(&self) -> Option<&TokenRefreshCoordinator> {
        self.coordinator.as_ref()
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    /// Pager over the session endpoint
    pub fn pager<T>(&self) -> JsonPager<T, Arc<dyn Transport>>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        self.provider
            .pager(self.transport(), self.url.clone(), self.page_size)
    }

    /// Loader over the session endpoint
    pub fn loader<T>(&self) -> ResourceLoader<JsonPager<T, Arc<dyn Transport>>>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        ResourceLoader::with_event_capacity(self.pager(), self.event_capacity)
    }
}

impl std::fmt::Debug for ProviderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSession")
            .field("provider", &self.provider)
            .field("url", &self.url)
            .field("page_size", &self.page_size)
            .field("coordinator", &self.coordinator)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pmofeed::{HttpRequest, HttpResponse, TransportError};

    struct Offline;

    #[async_trait]
    impl Transport for Offline {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
            Err(TransportError::Network("offline".into()))
        }
    }

    #[test]
    fn test_page_size_override_reaches_the_pager() {
        let session =
            ProviderSession::new(Provider::Blogs, "https://blogs.test/api", 20, Arc::new(Offline))
                .with_page_size(7);

        assert_eq!(session.page_size(), 7);
        assert_eq!(session.pager::<serde_json::Value>().page_size(), 7);
        assert_eq!(session.clone().with_page_size(0).page_size(), 1);
    }
}
