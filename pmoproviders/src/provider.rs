//! Paging presets for the supported providers

use crate::error::ProviderError;
use crate::paging::{JsonPager, PagingStyle};
use pmofeed::Transport;
use serde::de::DeserializeOwned;
use std::fmt;
use std::str::FromStr;

/// A content provider aggregated by PMOFeed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Spotify,
    AppleMusic,
    SoundCloud,
    YouTube,
    /// Blog index HTTP API (no OAuth)
    Blogs,
}

impl Provider {
    pub const ALL: [Provider; 5] = [
        Provider::Spotify,
        Provider::AppleMusic,
        Provider::SoundCloud,
        Provider::YouTube,
        Provider::Blogs,
    ];

    /// Key used under `providers.` in the configuration
    pub fn name(self) -> &'static str {
        match self {
            Provider::Spotify => "spotify",
            Provider::AppleMusic => "applemusic",
            Provider::SoundCloud => "soundcloud",
            Provider::YouTube => "youtube",
            Provider::Blogs => "blogs",
        }
    }

    /// Whether requests must carry an OAuth bearer token
    pub fn requires_oauth(self) -> bool {
        !matches!(self, Provider::Blogs)
    }

    /// Response field holding the item array
    pub fn items_field(self) -> &'static str {
        match self {
            Provider::Spotify | Provider::YouTube => "items",
            Provider::AppleMusic => "data",
            Provider::SoundCloud => "collection",
            Provider::Blogs => "blogs",
        }
    }

    pub fn paging_style(self) -> PagingStyle {
        match self {
            Provider::Spotify | Provider::AppleMusic => {
                PagingStyle::offset_limit("offset", "limit").with_next_field("next")
            }
            Provider::YouTube => PagingStyle::page_token("pageToken", "maxResults", "nextPageToken"),
            Provider::SoundCloud => PagingStyle::next_href("limit", "next_href"),
            Provider::Blogs => PagingStyle::offset_limit("offset", "count").with_total_field("total"),
        }
    }

    /// Query parameters every first request carries
    pub fn default_query(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Provider::YouTube => &[("part", "snippet"), ("mine", "true")],
            Provider::SoundCloud => &[("linked_partitioning", "1")],
            _ => &[],
        }
    }

    /// Builds a pager for `url` with this provider's conventions
    pub fn pager<T, Tr>(self, transport: Tr, url: impl Into<String>, page_size: u64) -> JsonPager<T, Tr>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
        Tr: Transport + 'static,
    {
        self.default_query().iter().fold(
            JsonPager::new(transport, url, self.items_field(), self.paging_style(), page_size),
            |pager, (key, value)| pager.with_query(*key, *value),
        )
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Provider {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace(['-', '_', ' '], "");
        Provider::ALL
            .into_iter()
            .find(|p| p.name() == wanted)
            .ok_or_else(|| ProviderError::UnknownProvider(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str() {
        assert_eq!("Spotify".parse::<Provider>().unwrap(), Provider::Spotify);
        assert_eq!("apple-music".parse::<Provider>().unwrap(), Provider::AppleMusic);
        assert_eq!("you_tube".parse::<Provider>().unwrap(), Provider::YouTube);
        assert!(matches!(
            "napster".parse::<Provider>(),
            Err(ProviderError::UnknownProvider(_))
        ));
    }

    #[test]
    fn test_names_round_trip() {
        for provider in Provider::ALL {
            assert_eq!(provider.name().parse::<Provider>().unwrap(), provider);
        }
    }

    #[test]
    fn test_only_blogs_skip_oauth() {
        let open: Vec<_> = Provider::ALL
            .into_iter()
            .filter(|p| !p.requires_oauth())
            .collect();
        assert_eq!(open, vec![Provider::Blogs]);
    }
}
