//! Provider paging contract consumed by [`ResourceLoader`](crate::ResourceLoader)

use crate::cursor::{CursorPosition, PageCursor};
use crate::error::Result;
use async_trait::async_trait;

/// One decoded page of provider items
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_more: bool,
    /// Where the following page starts
    pub next: CursorPosition,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, has_more: bool, next: CursorPosition) -> Self {
        Self {
            items,
            has_more,
            next,
        }
    }

    /// Last page of a collection
    pub fn last(items: Vec<T>, next: CursorPosition) -> Self {
        Self::new(items, false, next)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A paginated collection exposed by one provider
///
/// `fetch_page` must be monotonic: replaying the same cursor returns the
/// same page, so a failed fetch can be retried without gaps or duplicates.
/// An authorization failure that could not be recovered reaches the loader
/// as [`FeedError::FetchFailed`](crate::FeedError::FetchFailed).
#[async_trait]
pub trait PageSource: Send + Sync + 'static {
    type Item: Clone + Send + Sync + 'static;

    /// Cursor designating the first page
    fn first_page(&self) -> PageCursor;

    /// Fetches the page starting at `cursor`
    async fn fetch_page(&self, cursor: &PageCursor) -> Result<Page<Self::Item>>;
}

#[async_trait]
impl<S: PageSource> PageSource for std::sync::Arc<S> {
    type Item = S::Item;

    fn first_page(&self) -> PageCursor {
        (**self).first_page()
    }

    async fn fetch_page(&self, cursor: &PageCursor) -> Result<Page<Self::Item>> {
        (**self).fetch_page(cursor).await
    }
}
