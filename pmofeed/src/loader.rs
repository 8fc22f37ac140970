//! Paginated resource loader
//!
//! A [`ResourceLoader`] walks a [`PageSource`] page by page, accumulating
//! items in arrival order. It runs at most one page request at a time and
//! reports progress as [`LoaderEvent`]s on a broadcast channel:
//!
//! ```text
//!            fetch_next()              page received
//!   Init ─────────────────▶ Fetching ─────────────────▶ Normal
//!                             │  ▲                         │
//!               fetch failed  │  │ fetch_next()            │ fetch_next()
//!                             ▼  │                         │
//!                            Error ◀───────────────────────┘ (on failure)
//! ```
//!
//! A failed fetch leaves the cursor untouched, so the next `fetch_next()`
//! requests the very same page.

use crate::cursor::PageCursor;
use crate::source::PageSource;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Default capacity of the event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Loader state; exactly one is active at a time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    /// Nothing fetched yet
    Init,
    /// A page request is in flight
    Fetching,
    /// The last fetch succeeded
    Normal,
    /// The last fetch failed; `fetch_next()` retries the same page
    Error,
}

impl fmt::Display for LoaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoaderState::Init => "init",
            LoaderState::Fetching => "fetching",
            LoaderState::Normal => "normal",
            LoaderState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Progress notifications, delivered in emission order
///
/// Between two `StartLoading` there is always exactly one
/// `CompleteLoading` or `FailToLoad`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoaderEvent {
    StartLoading,
    CompleteLoading {
        /// Number of items appended by this page
        appended: usize,
        has_more: bool,
    },
    FailToLoad {
        reason: String,
    },
}

/// What a call to [`ResourceLoader::fetch_next`] or
/// [`ResourceLoader::refresh_latest`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    /// A page request was issued
    Started,
    /// A fetch was already in flight; nothing was issued
    AlreadyFetching,
    /// A refresh arrived during a fetch and was folded into it
    Coalesced,
    /// The collection has no more pages
    Exhausted,
    /// The loader was disposed
    Disposed,
}

impl FetchStatus {
    pub fn is_started(self) -> bool {
        matches!(self, FetchStatus::Started)
    }
}

struct Shared<T> {
    state: LoaderState,
    items: Vec<T>,
    cursor: PageCursor,
}

struct LoaderInner<S: PageSource> {
    source: S,
    shared: Mutex<Shared<S::Item>>,
    events: broadcast::Sender<LoaderEvent>,
    disposed: AtomicBool,
}

impl<S: PageSource> LoaderInner<S> {
    fn lock(&self) -> MutexGuard<'_, Shared<S::Item>> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: LoaderEvent) {
        // No subscriber is not an error
        let _ = self.events.send(event);
    }
}

/// Fetch/paginate state machine over one [`PageSource`]
///
/// Page requests run on spawned tokio tasks; `fetch_next` and
/// `refresh_latest` return immediately and completion is observed through
/// [`subscribe`](ResourceLoader::subscribe).
///
/// Dropping the loader disposes it: a request still in flight completes
/// in the background but its result is discarded and no event is emitted.
///
/// # Panics
///
/// `fetch_next` and `refresh_latest` panic when called outside a tokio
/// runtime.
///
/// # Example
///
/// ```no_run
/// use pmofeed::{LoaderEvent, PageSource, ResourceLoader};
///
/// async fn load_all<S: PageSource>(source: S) -> Vec<S::Item> {
///     let loader = ResourceLoader::new(source);
///     let mut events = loader.subscribe();
///
///     while loader.fetch_next().is_started() {
///         loop {
///             match events.recv().await {
///                 Ok(LoaderEvent::CompleteLoading { .. }) => break,
///                 Ok(LoaderEvent::FailToLoad { .. }) | Err(_) => return loader.items(),
///                 Ok(LoaderEvent::StartLoading) => {}
///             }
///         }
///     }
///     loader.items()
/// }
/// ```
pub struct ResourceLoader<S: PageSource> {
    inner: Arc<LoaderInner<S>>,
}

impl<S: PageSource> ResourceLoader<S> {
    pub fn new(source: S) -> Self {
        Self::with_event_capacity(source, DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_event_capacity(source: S, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        let cursor = source.first_page();
        Self {
            inner: Arc::new(LoaderInner {
                source,
                shared: Mutex::new(Shared {
                    state: LoaderState::Init,
                    items: Vec::new(),
                    cursor,
                }),
                events,
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Requests the next page
    ///
    /// No-op when a fetch is already in flight or the collection is
    /// exhausted. Retries the same page after a failure.
    pub fn fetch_next(&self) -> FetchStatus {
        let mut shared = self.inner.lock();
        if self.is_disposed() {
            return FetchStatus::Disposed;
        }
        if shared.state == LoaderState::Fetching {
            debug!("Fetch already in flight, ignoring");
            return FetchStatus::AlreadyFetching;
        }
        if !shared.cursor.has_more() {
            debug!("No more pages");
            return FetchStatus::Exhausted;
        }

        self.start(&mut shared);
        FetchStatus::Started
    }

    /// Restarts from the first page (pull-to-refresh)
    ///
    /// Clears the items and resets the cursor before fetching. When a fetch
    /// is in flight the refresh is coalesced into it and nothing is reset.
    pub fn refresh_latest(&self) -> FetchStatus {
        let mut shared = self.inner.lock();
        if self.is_disposed() {
            return FetchStatus::Disposed;
        }
        if shared.state == LoaderState::Fetching {
            debug!("Refresh coalesced into the fetch in flight");
            return FetchStatus::Coalesced;
        }

        let first = self.inner.source.first_page();
        shared.cursor.reset(first.position().clone());
        shared.items.clear();

        self.start(&mut shared);
        FetchStatus::Started
    }

    /// Makes the loader inert
    ///
    /// Later completions are dropped and no further event is emitted.
    /// A token refresh shared with other loaders is not affected.
    pub fn dispose(&self) {
        let _shared = self.inner.lock();
        if !self.inner.disposed.swap(true, Ordering::AcqRel) {
            debug!("Loader disposed");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LoaderEvent> {
        self.inner.events.subscribe()
    }

    pub fn state(&self) -> LoaderState {
        self.inner.lock().state
    }

    /// Snapshot of the items loaded so far, in arrival order
    pub fn items(&self) -> Vec<S::Item> {
        self.inner.lock().items.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    pub fn cursor(&self) -> PageCursor {
        self.inner.lock().cursor.clone()
    }

    /// True while the collection may have more pages
    pub fn needs_fetch(&self) -> bool {
        self.inner.lock().cursor.has_more()
    }

    pub fn source(&self) -> &S {
        &self.inner.source
    }

    /// Must be called with the shared state locked
    fn start(&self, shared: &mut Shared<S::Item>) {
        shared.state = LoaderState::Fetching;
        self.inner.emit(LoaderEvent::StartLoading);

        let cursor = shared.cursor.clone();
        debug!(cursor = %cursor.position(), "Fetching page");

        tokio::spawn(Self::run_fetch(Arc::clone(&self.inner), cursor));
    }

    async fn run_fetch(inner: Arc<LoaderInner<S>>, cursor: PageCursor) {
        let result = inner.source.fetch_page(&cursor).await;

        let mut shared = inner.lock();
        if inner.disposed.load(Ordering::Acquire) {
            debug!(cursor = %cursor.position(), "Loader disposed, dropping page result");
            return;
        }

        match result {
            Ok(page) => {
                let appended = page.items.len();
                shared.items.extend(page.items);
                shared.cursor.advance(page.next, page.has_more);
                shared.state = LoaderState::Normal;
                let has_more = shared.cursor.has_more();
                debug!(appended, has_more, total = shared.items.len(), "Page loaded");
                inner.emit(LoaderEvent::CompleteLoading { appended, has_more });
            }
            Err(e) => {
                shared.state = LoaderState::Error;
                warn!(cursor = %cursor.position(), status = ?e.status(), "Failed to load page: {}", e);
                inner.emit(LoaderEvent::FailToLoad {
                    reason: e.to_string(),
                });
            }
        }
    }
}

impl<S: PageSource> Drop for ResourceLoader<S> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<S: PageSource> fmt::Debug for ResourceLoader<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = self.inner.lock();
        f.debug_struct("ResourceLoader")
            .field("state", &shared.state)
            .field("items", &shared.items.len())
            .field("cursor", &shared.cursor)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
