//! # PMOFeed - Authenticated paginated resource loading
//!
//! This crate is the core of PMOFeed. It loads paginated collections
//! (playlists, tracks, blog posts, activity feeds) from third-party
//! providers behind one protocol, and survives expired OAuth access tokens
//! without the caller noticing.
//!
//! ## Building blocks
//!
//! - [`ResourceLoader`]: fetch/paginate state machine with at most one
//!   request in flight, reporting [`LoaderEvent`]s on a broadcast channel
//! - [`PageSource`]: a provider's paging API, returning a [`Page`] per [`PageCursor`]
//! - [`Transport`]: one call, one HTTP request; [`ReqwestTransport`] is the default
//! - [`TokenRefreshCoordinator`]: single-flight refresh of a shared credential
//! - [`AuthenticatedTransport`]: signs requests and replays them after a refresh
//!
//! ## Example
//!
//! ```no_run
//! use pmofeed::{
//!     AuthenticatedTransport, Credential, LoaderEvent, OAuth2TokenExchange, ReqwestTransport,
//!     ResourceLoader, TokenRefreshCoordinator,
//! };
//! # use pmofeed::{Page, PageCursor, PageSource, CursorPosition};
//! # struct Playlists<T>(T);
//! # #[async_trait::async_trait]
//! # impl<T: pmofeed::Transport + 'static> PageSource for Playlists<T> {
//! #     type Item = String;
//! #     fn first_page(&self) -> PageCursor { PageCursor::new(CursorPosition::first_offset()) }
//! #     async fn fetch_page(&self, _: &PageCursor) -> pmofeed::Result<Page<String>> { unimplemented!() }
//! # }
//!
//! #[tokio::main]
//! async fn main() -> pmofeed::Result<()> {
//!     let coordinator = TokenRefreshCoordinator::new(
//!         Credential::new("access-token", "refresh-token"),
//!         OAuth2TokenExchange::new("https://accounts.spotify.com/api/token", "client-id")?,
//!     );
//!     let transport = AuthenticatedTransport::new(ReqwestTransport::new()?, coordinator);
//!
//!     let loader = ResourceLoader::new(Playlists(transport));
//!     let mut events = loader.subscribe();
//!     loader.fetch_next();
//!
//!     while let Ok(event) = events.recv().await {
//!         if let LoaderEvent::CompleteLoading { appended, .. } = event {
//!             println!("{} playlists loaded", appended);
//!             break;
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `pmoconfig` (default): [`FeedConfigExt`] for reading loader, HTTP and
//!   authentication settings from the PMOFeed configuration

pub mod auth;
pub mod cursor;
pub mod error;
pub mod http;
pub mod loader;
pub mod source;
pub mod transport;

#[cfg(feature = "pmoconfig")]
pub mod config_ext;

pub use auth::{
    AuthenticatedTransport, Credential, OAuth2TokenExchange, RefreshEvent, RetryDecision,
    TokenExchange, TokenRefreshCoordinator, TokenSet,
};
pub use cursor::{CursorPosition, PageCursor};
pub use error::{FeedError, Result};
pub use http::{ClientBuilder, ReqwestTransport};
pub use loader::{FetchStatus, LoaderEvent, LoaderState, ResourceLoader};
pub use source::{Page, PageSource};
pub use transport::{HttpRequest, HttpResponse, Transport, TransportError};

#[cfg(feature = "pmoconfig")]
pub use config_ext::FeedConfigExt;
