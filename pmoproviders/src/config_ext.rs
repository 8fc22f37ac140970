//! Extension pour intégrer les fournisseurs dans pmoconfig
//!
//! Ce module fournit le trait `ProviderConfigExt` qui ajoute à
//! `pmoconfig::Config` la gestion des réglages par fournisseur
//! (`providers.<nom>.*`) : activation, URL, taille de page et identifiants
//! OAuth. Les refresh tokens et client secrets sont stockés chiffrés.
//!
//! # Exemple
//!
//! ```no_run
//! use pmoconfig::get_config;
//! use pmoproviders::{Provider, ProviderConfigExt};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = get_config();
//! let session = config.build_provider_session(Provider::Spotify)?;
//! let loader = session.loader::<serde_json::Value>();
//! # let _ = loader;
//! # Ok(())
//! # }
//! ```

use crate::error::ProviderError;
use crate::provider::Provider;
use crate::session::ProviderSession;
use anyhow::Result;
use chrono::{DateTime, Utc};
use pmoconfig::Config;
use pmofeed::{
    AuthenticatedTransport, Credential, FeedConfigExt, OAuth2TokenExchange, TokenRefreshCoordinator,
    Transport,
};
use serde_yaml::{Number, Value};
use std::sync::Arc;
use tracing::info;

/// Trait d'extension pour gérer les fournisseurs dans pmoconfig
pub trait ProviderConfigExt {
    // ========================================================================
    // Enable/Disable
    // ========================================================================

    /// Vérifie si le fournisseur est activé (défaut : `true`)
    fn get_provider_enabled(&self, provider: Provider) -> Result<bool>;

    fn set_provider_enabled(&self, provider: Provider, enabled: bool) -> Result<()>;

    // ========================================================================
    // Endpoint
    // ========================================================================

    /// URL complète de la collection paginée (`base_url` + `endpoint`)
    fn get_provider_url(&self, provider: Provider) -> Result<String>;

    /// Taille de page du fournisseur, sinon `loader.page_size`
    fn get_provider_page_size(&self, provider: Provider) -> Result<u64>;

    fn set_provider_page_size(&self, provider: Provider, page_size: u64) -> Result<()>;

    // ========================================================================
    // OAuth
    // ========================================================================

    fn get_provider_token_url(&self, provider: Provider) -> Result<Option<String>>;

    fn get_provider_client_id(&self, provider: Provider) -> Result<Option<String>>;

    /// Client secret (déchiffré)
    fn get_provider_client_secret(&self, provider: Provider) -> Result<Option<String>>;

    fn set_provider_client_secret(&self, provider: Provider, secret: &str) -> Result<()>;

    /// Paire de tokens enregistrée
    ///
    /// Erreur si `access_token` ou `refresh_token` est absent.
    fn get_provider_credential(&self, provider: Provider) -> Result<Credential>;

    /// Enregistre une paire de tokens (chiffrée)
    fn set_provider_credential(&self, provider: Provider, credential: &Credential) -> Result<()>;

    // ========================================================================
    // Construction
    // ========================================================================

    /// Construit le coordinateur de rafraîchissement du fournisseur
    fn build_token_coordinator(&self, provider: Provider) -> Result<TokenRefreshCoordinator>;

    /// Construit la session complète (transport authentifié si besoin)
    fn build_provider_session(&self, provider: Provider) -> Result<ProviderSession>;
}

fn path(provider: Provider, key: &'static str) -> [&'static str; 3] {
    ["providers", provider.name(), key]
}

fn required(value: Option<String>, provider: Provider, key: &'static str) -> Result<String> {
    value.ok_or_else(|| ProviderError::missing(provider.name(), key).into())
}

impl ProviderConfigExt for Config {
    fn get_provider_enabled(&self, provider: Provider) -> Result<bool> {
        self.get_bool(&path(provider, "enabled"), true)
    }

    fn set_provider_enabled(&self, provider: Provider, enabled: bool) -> Result<()> {
        self.set_value(&path(provider, "enabled"), Value::Bool(enabled))
    }

    fn get_provider_url(&self, provider: Provider) -> Result<String> {
        let base_url = required(
            self.get_string(&path(provider, "base_url"))?,
            provider,
            "base_url",
        )?;
        let endpoint = self
            .get_string(&path(provider, "endpoint"))?
            .unwrap_or_default();

        Ok(match endpoint.as_str() {
            "" => base_url,
            e if e.starts_with("http://") || e.starts_with("https://") => e.to_string(),
            e => format!(
                "{}/{}",
                base_url.trim_end_matches('/'),
                e.trim_start_matches('/')
            ),
        })
    }

    fn get_provider_page_size(&self, provider: Provider) -> Result<u64> {
        let default = self.get_loader_page_size()?;
        let page_size = self.get_u64(&path(provider, "page_size"), default)?;
        Ok(if page_size == 0 { default } else { page_size })
    }

    fn set_provider_page_size(&self, provider: Provider, page_size: u64) -> Result<()> {
        self.set_value(
            &path(provider, "page_size"),
            Value::Number(Number::from(page_size)),
        )
    }

    fn get_provider_token_url(&self, provider: Provider) -> Result<Option<String>> {
        self.get_string(&path(provider, "token_url"))
    }

    fn get_provider_client_id(&self, provider: Provider) -> Result<Option<String>> {
        self.get_string(&path(provider, "client_id"))
    }

    fn get_provider_client_secret(&self, provider: Provider) -> Result<Option<String>> {
        self.get_secret(&path(provider, "client_secret"))
    }

    fn set_provider_client_secret(&self, provider: Provider, secret: &str) -> Result<()> {
        self.set_secret(&path(provider, "client_secret"), secret)
    }

    fn get_provider_credential(&self, provider: Provider) -> Result<Credential> {
        let access_token = required(
            self.get_secret(&path(provider, "access_token"))?,
            provider,
            "access_token",
        )?;
        let refresh_token = required(
            self.get_secret(&path(provider, "refresh_token"))?,
            provider,
            "refresh_token",
        )?;

        let mut credential = Credential::new(access_token, refresh_token);
        if let Some(expires_at) = self.get_string(&path(provider, "expires_at"))? {
            // An unreadable expiry only disables proactive refresh
            if let Ok(expires_at) = DateTime::parse_from_rfc3339(&expires_at) {
                credential = credential.with_expiry(expires_at.with_timezone(&Utc));
            }
        }
        Ok(credential)
    }

    fn set_provider_credential(&self, provider: Provider, credential: &Credential) -> Result<()> {
        self.set_secret(&path(provider, "access_token"), &credential.access_token)?;
        self.set_secret(&path(provider, "refresh_token"), &credential.refresh_token)?;
        match credential.expires_at {
            Some(expires_at) => {
                self.set_string(&path(provider, "expires_at"), &expires_at.to_rfc3339())
            }
            None => self.set_value(&path(provider, "expires_at"), Value::Null),
        }
    }

    fn build_token_coordinator(&self, provider: Provider) -> Result<TokenRefreshCoordinator> {
        let token_url = required(self.get_provider_token_url(provider)?, provider, "token_url")?;
        let client_id = required(self.get_provider_client_id(provider)?, provider, "client_id")?;

        let mut exchange =
            OAuth2TokenExchange::with_transport(self.build_http_transport()?, token_url, client_id);
        if let Some(secret) = self.get_provider_client_secret(provider)? {
            exchange = exchange.with_client_secret(secret);
        }

        let coordinator =
            TokenRefreshCoordinator::new(self.get_provider_credential(provider)?, exchange);
        coordinator.set_refresh_lead(self.get_auth_refresh_lead()?);
        Ok(coordinator)
    }

    fn build_provider_session(&self, provider: Provider) -> Result<ProviderSession> {
        if !self.get_provider_enabled(provider)? {
            return Err(ProviderError::Disabled(provider.name().to_string()).into());
        }

        let url = self.get_provider_url(provider)?;
        let page_size = self.get_provider_page_size(provider)?;
        let http = self.build_http_transport()?;

        let session = if provider.requires_oauth() {
            let coordinator = self.build_token_coordinator(provider)?;
            let transport: Arc<dyn Transport> = Arc::new(
                AuthenticatedTransport::new(http, coordinator.clone())
                    .with_max_replays(self.get_auth_max_replays()?),
            );
            ProviderSession::new(provider, url, page_size, transport).with_coordinator(coordinator)
        } else {
            ProviderSession::new(provider, url, page_size, Arc::new(http))
        };

        info!(provider = %provider, url = %session.url(), page_size, "Provider session ready");
        Ok(session.with_event_capacity(self.get_loader_event_capacity()?))
    }
}
