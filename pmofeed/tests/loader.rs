//! ResourceLoader pagination, retry and coalescing behaviour

use async_trait::async_trait;
use pmofeed::{
    AuthenticatedTransport, Credential, CursorPosition, FeedError, FetchStatus, HttpRequest,
    HttpResponse, LoaderEvent, LoaderState, Page, PageCursor, PageSource, ResourceLoader,
    TokenExchange, TokenRefreshCoordinator, TokenSet, Transport, TransportError,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, Notify};

/// Offset-paginated collection of `0..total`
struct Catalog {
    total: u64,
    page_size: u64,
    requests: AtomicUsize,
    /// Offsets whose first request fails
    flaky: Mutex<HashSet<u64>>,
    gate: Option<Arc<Notify>>,
    completed: AtomicUsize,
}

impl Catalog {
    fn new(total: u64, page_size: u64) -> Self {
        Self {
            total,
            page_size,
            requests: AtomicUsize::new(0),
            flaky: Mutex::new(HashSet::new()),
            gate: None,
            completed: AtomicUsize::new(0),
        }
    }

    fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    fn failing_once_at(self, offset: u64) -> Self {
        self.flaky.lock().unwrap().insert(offset);
        self
    }
}

#[async_trait]
impl PageSource for Catalog {
    type Item = u64;

    fn first_page(&self) -> PageCursor {
        PageCursor::new(CursorPosition::first_offset())
    }

    async fn fetch_page(&self, cursor: &PageCursor) -> pmofeed::Result<Page<u64>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);

        let offset = cursor.position().offset().unwrap_or(0);
        if self.flaky.lock().unwrap().remove(&offset) {
            return Err(FeedError::from(TransportError::from_status(500, "boom")));
        }

        let end = (offset + self.page_size).min(self.total);
        let items: Vec<u64> = (offset..end).collect();
        Ok(Page::new(items, end < self.total, CursorPosition::Offset(end)))
    }
}

/// Waits for the event closing the current fetch
async fn settle(events: &mut broadcast::Receiver<LoaderEvent>) -> LoaderEvent {
    let next = async {
        loop {
            match events.recv().await.unwrap() {
                LoaderEvent::StartLoading => continue,
                other => return other,
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), next)
        .await
        .expect("fetch did not settle")
}

async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_twelve_items_in_pages_of_five() {
    let loader = ResourceLoader::new(Catalog::new(12, 5));
    let mut events = loader.subscribe();

    let mut counts = Vec::new();
    let mut has_more = Vec::new();
    for _ in 0..3 {
        assert_eq!(loader.fetch_next(), FetchStatus::Started);
        match settle(&mut events).await {
            LoaderEvent::CompleteLoading { appended, has_more: more } => {
                counts.push(appended);
                has_more.push(more);
                assert_eq!(loader.cursor().has_more(), more);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    assert_eq!(counts, vec![5, 5, 2]);
    assert_eq!(has_more, vec![true, true, false]);
    assert_eq!(loader.items(), (0..12).collect::<Vec<_>>());
    assert_eq!(loader.state(), LoaderState::Normal);
}

#[tokio::test]
async fn test_exhausted_loader_emits_nothing() {
    let source = Arc::new(Catalog::new(3, 5));
    let loader = ResourceLoader::new(source.clone());
    let mut events = loader.subscribe();

    loader.fetch_next();
    settle(&mut events).await;
    assert!(!loader.needs_fetch());

    assert_eq!(loader.fetch_next(), FetchStatus::Exhausted);
    assert_eq!(loader.fetch_next(), FetchStatus::Exhausted);
    assert!(matches!(
        events.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));
    assert_eq!(source.requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_no_duplicate_fetch_while_in_flight() {
    let gate = Arc::new(Notify::new());
    let source = Arc::new(Catalog::new(20, 5).gated(gate.clone()));
    let loader = ResourceLoader::new(source.clone());
    let mut events = loader.subscribe();

    assert_eq!(loader.fetch_next(), FetchStatus::Started);
    assert_eq!(loader.fetch_next(), FetchStatus::AlreadyFetching);
    assert_eq!(loader.refresh_latest(), FetchStatus::Coalesced);
    assert_eq!(loader.state(), LoaderState::Fetching);

    gate.notify_one();
    assert_eq!(events.recv().await.unwrap(), LoaderEvent::StartLoading);
    assert_eq!(
        settle(&mut events).await,
        LoaderEvent::CompleteLoading {
            appended: 5,
            has_more: true
        }
    );

    assert_eq!(source.requests.load(Ordering::SeqCst), 1);
    assert!(matches!(
        events.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));
}

#[tokio::test]
async fn test_failed_fetch_retries_the_same_page() {
    let reference = {
        let loader = ResourceLoader::new(Catalog::new(12, 5));
        let mut events = loader.subscribe();
        for _ in 0..3 {
            loader.fetch_next();
            settle(&mut events).await;
        }
        loader.items()
    };

    let loader = ResourceLoader::new(Catalog::new(12, 5).failing_once_at(5));
    let mut events = loader.subscribe();

    loader.fetch_next();
    settle(&mut events).await;

    loader.fetch_next();
    match settle(&mut events).await {
        LoaderEvent::FailToLoad { reason } => assert!(reason.contains("500")),
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(loader.state(), LoaderState::Error);
    assert_eq!(loader.cursor().position(), &CursorPosition::Offset(5));
    assert_eq!(loader.len(), 5);

    loader.fetch_next();
    settle(&mut events).await;
    loader.fetch_next();
    settle(&mut events).await;

    assert_eq!(loader.items(), reference);
}

#[tokio::test]
async fn test_refresh_latest_starts_over() {
    let loader = ResourceLoader::new(Catalog::new(12, 5));
    let mut events = loader.subscribe();

    loader.fetch_next();
    settle(&mut events).await;
    loader.fetch_next();
    settle(&mut events).await;
    assert_eq!(loader.len(), 10);

    assert_eq!(loader.refresh_latest(), FetchStatus::Started);
    assert!(loader.is_empty());
    settle(&mut events).await;

    assert_eq!(loader.items(), (0..5).collect::<Vec<_>>());
    assert_eq!(loader.cursor().position(), &CursorPosition::Offset(5));
}

#[tokio::test]
async fn test_disposed_loader_drops_completion() {
    let gate = Arc::new(Notify::new());
    let source = Arc::new(Catalog::new(12, 5).gated(gate.clone()));
    let loader = ResourceLoader::new(source.clone());
    let mut events = loader.subscribe();

    loader.fetch_next();
    assert_eq!(events.recv().await.unwrap(), LoaderEvent::StartLoading);

    loader.dispose();
    gate.notify_one();

    let completed = source.clone();
    wait_until(move || completed.completed.load(Ordering::SeqCst) == 1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(loader.is_empty());
    assert!(matches!(
        events.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));
    assert_eq!(loader.fetch_next(), FetchStatus::Disposed);
}

// ============================================================================
// Loaders sharing one coordinator
// ============================================================================

/// Serves `[offset, offset + 1]` to `Bearer fresh` only
struct ProtectedApi {
    requests: AtomicUsize,
}

#[async_trait]
impl Transport for ProtectedApi {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if request.header_value("Authorization") != Some("Bearer fresh") {
            return Err(TransportError::from_status(401, "expired"));
        }
        let offset: u64 = request
            .query
            .iter()
            .find(|(k, _)| k == "offset")
            .and_then(|(_, v)| v.parse().ok())
            .unwrap_or(0);
        Ok(HttpResponse::new(
            200,
            format!("[{}, {}]", offset, offset + 1),
        ))
    }
}

struct OnceExchange {
    calls: AtomicUsize,
}

#[async_trait]
impl TokenExchange for OnceExchange {
    async fn exchange(&self, _refresh_token: &str) -> pmofeed::Result<TokenSet> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(TokenSet {
            access_token: "fresh".into(),
            refresh_token: None,
            expires_at: None,
        })
    }
}

struct ProtectedFeed<T> {
    transport: T,
}

#[async_trait]
impl<T: Transport + 'static> PageSource for ProtectedFeed<T> {
    type Item = u64;

    fn first_page(&self) -> PageCursor {
        PageCursor::new(CursorPosition::first_offset())
    }

    async fn fetch_page(&self, cursor: &PageCursor) -> pmofeed::Result<Page<u64>> {
        let offset = cursor.position().offset().unwrap_or(0);
        let response = self
            .transport
            .send(HttpRequest::get("https://api.test/feed").query("offset", offset.to_string()))
            .await?;
        let items: Vec<u64> = response.json()?;
        let next = CursorPosition::Offset(offset + items.len() as u64);
        Ok(Page::new(items, true, next))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_loaders_never_see_absorbed_401() {
    let api = Arc::new(ProtectedApi {
        requests: AtomicUsize::new(0),
    });
    let exchange = Arc::new(OnceExchange {
        calls: AtomicUsize::new(0),
    });
    let coordinator =
        TokenRefreshCoordinator::with_shared_exchange(Credential::new("stale", "r"), exchange.clone());

    let loaders: Vec<_> = (0..3)
        .map(|_| {
            ResourceLoader::new(ProtectedFeed {
                transport: AuthenticatedTransport::new(api.clone(), coordinator.clone()),
            })
        })
        .collect();
    let mut subscriptions: Vec<_> = loaders.iter().map(|l| l.subscribe()).collect();

    for loader in &loaders {
        assert_eq!(loader.fetch_next(), FetchStatus::Started);
    }
    for events in &mut subscriptions {
        assert_eq!(
            settle(events).await,
            LoaderEvent::CompleteLoading {
                appended: 2,
                has_more: true
            }
        );
    }

    assert_eq!(exchange.calls.load(Ordering::SeqCst), 1);
    for loader in &loaders {
        assert_eq!(loader.items(), vec![0, 1]);
        assert_eq!(loader.state(), LoaderState::Normal);
    }
}
