//! Error types for provider setup

/// Result type alias for provider setup
pub type Result<T, E = ProviderError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The name does not match any known provider
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// The provider is disabled in the configuration
    #[error("Provider {0} is disabled")]
    Disabled(String),

    /// A required setting is missing from the configuration
    #[error("Missing setting providers.{provider}.{key}")]
    MissingSetting { provider: String, key: &'static str },

    /// Error from the loader core
    #[error(transparent)]
    Feed(#[from] pmofeed::FeedError),
}

impl ProviderError {
    pub fn missing(provider: impl Into<String>, key: &'static str) -> Self {
        Self::MissingSetting {
            provider: provider.into(),
            key,
        }
    }
}
