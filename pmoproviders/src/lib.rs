//! # PMOProviders - Provider paging adapters for PMOFeed
//!
//! Adapts the paging APIs of the providers aggregated by PMOFeed to the
//! [`pmofeed::PageSource`] contract:
//!
//! | Provider    | Items field  | Paging                                    |
//! |-------------|--------------|-------------------------------------------|
//! | Spotify     | `items`      | `offset`/`limit`, `next` URL              |
//! | Apple Music | `data`       | `offset`/`limit`, `next` URL              |
//! | YouTube     | `items`      | `pageToken`/`maxResults`, `nextPageToken` |
//! | SoundCloud  | `collection` | `limit` + `linked_partitioning`, `next_href` |
//! | Blog index  | `blogs`      | `offset`/`count`, `total`                 |
//!
//! Item schemas are left to the caller: [`JsonPager`] decodes the item
//! array into any `DeserializeOwned` type (`serde_json::Value` works).
//!
//! ## Example
//!
//! ```no_run
//! use pmofeed::ReqwestTransport;
//! use pmoproviders::Provider;
//!
//! # fn main() -> pmofeed::Result<()> {
//! let pager = Provider::Blogs.pager::<serde_json::Value, _>(
//!     ReqwestTransport::new()?,
//!     "https://api.hypem.com/v2/blogs",
//!     5,
//! );
//! let loader = pmofeed::ResourceLoader::new(pager);
//! # let _ = loader;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod paging;
pub mod provider;
pub mod session;

#[cfg(feature = "pmoconfig")]
pub mod config_ext;

pub use error::{ProviderError, Result};
pub use paging::{JsonPager, PagingStyle};
pub use provider::Provider;
pub use session::ProviderSession;

#[cfg(feature = "pmoconfig")]
pub use config_ext::ProviderConfigExt;
