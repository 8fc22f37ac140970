//! Generic JSON pager
//!
//! Provider APIs paginate in one of three ways:
//!
//! - **offset/limit**: the client asks for `limit` items starting at
//!   `offset` (Spotify, Apple Music, blog index)
//! - **page token**: each response carries an opaque token for the next
//!   page (YouTube)
//! - **next href**: each response carries the absolute URL of the next
//!   page (SoundCloud)
//!
//! [`JsonPager`] speaks all three and decodes the item array into the
//! caller's type. Authentication is the transport's business: hand it an
//! `AuthenticatedTransport` for OAuth providers.

use async_trait::async_trait;
use pmofeed::{
    CursorPosition, FeedError, HttpRequest, Page, PageCursor, PageSource, Transport,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;
use tracing::debug;

/// How a provider paginates, with the parameter and field names it uses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PagingStyle {
    OffsetLimit {
        offset_param: String,
        limit_param: String,
        /// Response field holding the next page URL (null on the last page)
        next_field: Option<String>,
        /// Response field holding the collection size
        total_field: Option<String>,
    },
    PageToken {
        token_param: String,
        size_param: String,
        next_token_field: String,
    },
    NextHref {
        size_param: String,
        next_href_field: String,
    },
}

impl PagingStyle {
    pub fn offset_limit(offset_param: &str, limit_param: &str) -> Self {
        Self::OffsetLimit {
            offset_param: offset_param.to_string(),
            limit_param: limit_param.to_string(),
            next_field: None,
            total_field: None,
        }
    }

    pub fn page_token(token_param: &str, size_param: &str, next_token_field: &str) -> Self {
        Self::PageToken {
            token_param: token_param.to_string(),
            size_param: size_param.to_string(),
            next_token_field: next_token_field.to_string(),
        }
    }

    pub fn next_href(size_param: &str, next_href_field: &str) -> Self {
        Self::NextHref {
            size_param: size_param.to_string(),
            next_href_field: next_href_field.to_string(),
        }
    }

    /// Sets the field whose nullity tells whether a next page exists
    pub fn with_next_field(mut self, field: &str) -> Self {
        if let Self::OffsetLimit { next_field, .. } = &mut self {
            *next_field = Some(field.to_string());
        }
        self
    }

    /// Sets the field holding the total number of items
    pub fn with_total_field(mut self, field: &str) -> Self {
        if let Self::OffsetLimit { total_field, .. } = &mut self {
            *total_field = Some(field.to_string());
        }
        self
    }

    /// Cursor designating the first page in this style
    pub fn first_page(&self) -> PageCursor {
        match self {
            Self::OffsetLimit { .. } => PageCursor::new(CursorPosition::first_offset()),
            Self::PageToken { .. } | Self::NextHref { .. } => {
                PageCursor::new(CursorPosition::first_token())
            }
        }
    }
}

/// [`PageSource`] over a JSON HTTP API
pub struct JsonPager<T, Tr> {
    transport: Tr,
    url: String,
    /// JSON pointer to the item array (`""` for a top-level array)
    items_pointer: String,
    style: PagingStyle,
    page_size: u64,
    extra_query: Vec<(String, String)>,
    _item: PhantomData<fn() -> T>,
}

impl<T, Tr> JsonPager<T, Tr>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
    Tr: Transport + 'static,
{
    /// Pages through `url`, reading items from the top-level `items_field`
    pub fn new(
        transport: Tr,
        url: impl Into<String>,
        items_field: &str,
        style: PagingStyle,
        page_size: u64,
    ) -> Self {
        Self {
            transport,
            url: url.into(),
            items_pointer: to_pointer(items_field),
            style,
            page_size: page_size.max(1),
            extra_query: Vec::new(),
            _item: PhantomData,
        }
    }

    /// Adds a query parameter sent with the first request
    ///
    /// Also sent with every subsequent request except in the next-href
    /// style, where the provider's URL already carries them.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_query.push((key.into(), value.into()));
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn style(&self) -> &PagingStyle {
        &self.style
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    fn base_request(&self, url: &str) -> HttpRequest {
        let mut request = HttpRequest::get(url).header("Accept", "application/json");
        for (key, value) in &self.extra_query {
            request = request.query(key.clone(), value.clone());
        }
        request
    }

    fn request(&self, position: &CursorPosition) -> HttpRequest {
        let size = self.page_size.to_string();
        match &self.style {
            PagingStyle::OffsetLimit {
                offset_param,
                limit_param,
                ..
            } => self
                .base_request(&self.url)
                .query(offset_param.clone(), position.offset().unwrap_or(0).to_string())
                .query(limit_param.clone(), size),
            PagingStyle::PageToken {
                token_param,
                size_param,
                ..
            } => {
                let request = self.base_request(&self.url).query(size_param.clone(), size);
                match position.token() {
                    Some(token) => request.query(token_param.clone(), token),
                    None => request,
                }
            }
            PagingStyle::NextHref { size_param, .. } => match position.token() {
                Some(href) => HttpRequest::get(href).header("Accept", "application/json"),
                None => self.base_request(&self.url).query(size_param.clone(), size),
            },
        }
    }

    fn decode(&self, position: &CursorPosition, body: &str) -> pmofeed::Result<Page<T>> {
        let document: Value = serde_json::from_str(body)?;

        let items: Vec<T> = match document.pointer(&self.items_pointer) {
            Some(Value::Null) | None => Vec::new(),
            Some(value) => serde_json::from_value(value.clone())?,
        };
        let received = items.len() as u64;

        let (has_more, next) = match &self.style {
            PagingStyle::OffsetLimit {
                next_field,
                total_field,
                ..
            } => {
                let offset = position.offset().unwrap_or(0);
                let next_offset = offset + received;
                let has_more = if received == 0 {
                    false
                } else if let Some(next) = next_field.as_deref().and_then(|f| document.get(f)) {
                    non_empty_string(next).is_some()
                } else if let Some(total) = total_field
                    .as_deref()
                    .and_then(|f| document.get(f))
                    .and_then(Value::as_u64)
                {
                    next_offset < total
                } else {
                    received >= self.page_size
                };
                (has_more, CursorPosition::Offset(next_offset))
            }
            PagingStyle::PageToken {
                next_token_field, ..
            } => {
                let token = document.get(next_token_field).and_then(non_empty_string);
                (token.is_some(), CursorPosition::Token(token))
            }
            PagingStyle::NextHref {
                next_href_field, ..
            } => {
                let href = document.get(next_href_field).and_then(non_empty_string);
                (href.is_some(), CursorPosition::Token(href))
            }
        };

        Ok(Page::new(items, has_more, next))
    }
}

#[async_trait]
impl<T, Tr> PageSource for JsonPager<T, Tr>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
    Tr: Transport + 'static,
{
    type Item = T;

    fn first_page(&self) -> PageCursor {
        self.style.first_page()
    }

    async fn fetch_page(&self, cursor: &PageCursor) -> pmofeed::Result<Page<T>> {
        if !cursor.has_more() {
            return Err(FeedError::other("Collection already exhausted"));
        }

        let request = self.request(cursor.position());
        debug!(cursor = %cursor.position(), "Requesting {}", request);

        let response = self.transport.send(request).await?;
        let page = self.decode(cursor.position(), &response.body)?;

        debug!(
            items = page.len(),
            has_more = page.has_more,
            "Page decoded from {}", self.url
        );
        Ok(page)
    }
}

impl<T, Tr> fmt::Debug for JsonPager<T, Tr> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonPager")
            .field("url", &self.url)
            .field("items_pointer", &self.items_pointer)
            .field("style", &self.style)
            .field("page_size", &self.page_size)
            .finish()
    }
}

fn to_pointer(field: &str) -> String {
    if field.is_empty() || field.starts_with('/') {
        field.to_string()
    } else {
        format!("/{}", field)
    }
}

fn non_empty_string(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pmofeed::{HttpResponse, TransportError};

    struct Unused;

    #[async_trait]
    impl Transport for Unused {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
            Err(TransportError::Network("not expected".into()))
        }
    }

    fn pager(style: PagingStyle, items: &str) -> JsonPager<u32, Unused> {
        JsonPager::new(Unused, "https://api.test/items", items, style, 5)
    }

    #[test]
    fn test_offset_request() {
        let pager = pager(PagingStyle::offset_limit("offset", "limit"), "items")
            .with_query("market", "FR");
        let request = pager.request(&CursorPosition::Offset(10));

        assert_eq!(
            request.query,
            vec![
                ("market".to_string(), "FR".to_string()),
                ("offset".to_string(), "10".to_string()),
                ("limit".to_string(), "5".to_string()),
            ]
        );
    }

    #[test]
    fn test_offset_has_more_from_next_field() {
        let pager = pager(
            PagingStyle::offset_limit("offset", "limit").with_next_field("next"),
            "items",
        );

        let page = pager
            .decode(
                &CursorPosition::Offset(0),
                r#"{"items":[1,2,3,4,5],"next":"https://api.test/items?offset=5"}"#,
            )
            .unwrap();
        assert!(page.has_more);
        assert_eq!(page.next, CursorPosition::Offset(5));

        let page = pager
            .decode(&CursorPosition::Offset(5), r#"{"items":[6,7,8,9,10],"next":null}"#)
            .unwrap();
        assert!(!page.has_more);
    }

    #[test]
    fn test_offset_has_more_from_total() {
        let pager = pager(
            PagingStyle::offset_limit("offset", "count").with_total_field("total"),
            "blogs",
        );
        let page = pager
            .decode(&CursorPosition::Offset(5), r#"{"blogs":[1,2],"total":7}"#)
            .unwrap();
        assert!(!page.has_more);
        assert_eq!(page.next, CursorPosition::Offset(7));
    }

    #[test]
    fn test_offset_has_more_from_page_size() {
        let pager = pager(PagingStyle::offset_limit("offset", "limit"), "");
        assert!(pager.decode(&CursorPosition::Offset(0), "[1,2,3,4,5]").unwrap().has_more);
        assert!(!pager.decode(&CursorPosition::Offset(5), "[6,7]").unwrap().has_more);
        assert!(!pager.decode(&CursorPosition::Offset(7), "[]").unwrap().has_more);
    }

    #[test]
    fn test_page_token() {
        let pager = pager(
            PagingStyle::page_token("pageToken", "maxResults", "nextPageToken"),
            "items",
        );

        let first = pager.request(&CursorPosition::first_token());
        assert_eq!(first.query, vec![("maxResults".to_string(), "5".to_string())]);

        let page = pager
            .decode(&CursorPosition::first_token(), r#"{"items":[1],"nextPageToken":"CAUQAA"}"#)
            .unwrap();
        assert!(page.has_more);
        assert_eq!(page.next, CursorPosition::Token(Some("CAUQAA".into())));

        let second = pager.request(&page.next);
        assert!(second
            .query
            .contains(&("pageToken".to_string(), "CAUQAA".to_string())));

        let last = pager
            .decode(&page.next, r#"{"items":[2],"nextPageToken":""}"#)
            .unwrap();
        assert!(!last.has_more);
    }

    #[test]
    fn test_next_href() {
        let pager = pager(PagingStyle::next_href("limit", "next_href"), "collection")
            .with_query("linked_partitioning", "1");

        let first = pager.request(&CursorPosition::first_token());
        assert_eq!(first.url, "https://api.test/items");
        assert!(first
            .query
            .contains(&("linked_partitioning".to_string(), "1".to_string())));

        let page = pager
            .decode(
                &CursorPosition::first_token(),
                r#"{"collection":[1,2],"next_href":"https://api.test/items?cursor=abc"}"#,
            )
            .unwrap();
        let second = pager.request(&page.next);
        assert_eq!(second.url, "https://api.test/items?cursor=abc");
        assert!(second.query.is_empty());
    }

    #[test]
    fn test_bad_items_are_a_decode_error() {
        let pager = pager(PagingStyle::offset_limit("offset", "limit"), "items");
        let err = pager
            .decode(&CursorPosition::Offset(0), r#"{"items":["x"]}"#)
            .unwrap_err();
        assert!(matches!(err, FeedError::Decode(_)));
    }
}
