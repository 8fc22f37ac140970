//! Extension pour intégrer les réglages du chargeur dans pmoconfig
//!
//! Ce module fournit le trait `FeedConfigExt` qui ajoute à
//! `pmoconfig::Config` les réglages du cœur PMOFeed : taille de page,
//! capacité du canal d'événements, client HTTP et politique de rejeu.
//!
//! # Exemple
//!
//! ```no_run
//! use pmoconfig::get_config;
//! use pmofeed::FeedConfigExt;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = get_config();
//! let transport = config.build_http_transport()?;
//! println!("page size: {}", config.get_loader_page_size()?);
//! # let _ = transport;
//! # Ok(())
//! # }
//! ```

use crate::auth::DEFAULT_MAX_REPLAYS;
use crate::auth::coordinator::DEFAULT_REFRESH_LEAD_SECS;
use crate::http::{ReqwestTransport, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_USER_AGENT};
use crate::loader::DEFAULT_EVENT_CAPACITY;
use anyhow::Result;
use pmoconfig::Config;
use serde_yaml::{Number, Value};
use std::time::Duration;

/// Default number of items requested per page
pub const DEFAULT_PAGE_SIZE: u64 = 20;

/// Trait d'extension pour les réglages du chargeur dans pmoconfig
///
/// Les getters retournent la valeur par défaut lorsque la clé est absente
/// ou mal typée.
pub trait FeedConfigExt {
    // ========================================================================
    // Loader
    // ========================================================================

    /// Nombre d'éléments demandés par page (défaut : 20)
    fn get_loader_page_size(&self) -> Result<u64>;

    fn set_loader_page_size(&self, page_size: u64) -> Result<()>;

    /// Capacité du canal d'événements du chargeur (défaut : 64)
    fn get_loader_event_capacity(&self) -> Result<usize>;

    // ========================================================================
    // HTTP
    // ========================================================================

    /// Timeout des requêtes HTTP (défaut : 30 secondes)
    fn get_http_timeout(&self) -> Result<Duration>;

    fn get_http_user_agent(&self) -> Result<String>;

    /// Construit le transport HTTP à partir des réglages
    fn build_http_transport(&self) -> Result<ReqwestTransport>;

    // ========================================================================
    // Authentification
    // ========================================================================

    /// Nombre maximal de rejeux d'une requête après un rafraîchissement (défaut : 1)
    fn get_auth_max_replays(&self) -> Result<u32>;

    fn set_auth_max_replays(&self, max_replays: u32) -> Result<()>;

    /// Marge avant expiration déclenchant un rafraîchissement anticipé (défaut : 60 s)
    fn get_auth_refresh_lead(&self) -> Result<chrono::Duration>;
}

impl FeedConfigExt for Config {
    fn get_loader_page_size(&self) -> Result<u64> {
        let page_size = self.get_u64(&["loader", "page_size"], DEFAULT_PAGE_SIZE)?;
        Ok(if page_size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            page_size
        })
    }

    fn set_loader_page_size(&self, page_size: u64) -> Result<()> {
        self.set_value(
            &["loader", "page_size"],
            Value::Number(Number::from(page_size)),
        )
    }

    fn get_loader_event_capacity(&self) -> Result<usize> {
        let capacity =
            self.get_u64(&["loader", "event_capacity"], DEFAULT_EVENT_CAPACITY as u64)?;
        Ok(usize::try_from(capacity)
            .ok()
            .filter(|c| *c > 0)
            .unwrap_or(DEFAULT_EVENT_CAPACITY))
    }

    fn get_http_timeout(&self) -> Result<Duration> {
        let secs = self.get_u64(&["http", "timeout_secs"], DEFAULT_REQUEST_TIMEOUT_SECS)?;
        Ok(Duration::from_secs(secs))
    }

    fn get_http_user_agent(&self) -> Result<String> {
        Ok(self
            .get_string(&["http", "user_agent"])?
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()))
    }

    fn build_http_transport(&self) -> Result<ReqwestTransport> {
        let transport = ReqwestTransport::builder()
            .timeout(self.get_http_timeout()?)
            .user_agent(self.get_http_user_agent()?)
            .build()?;
        Ok(transport)
    }

    fn get_auth_max_replays(&self) -> Result<u32> {
        let replays = self.get_u64(&["auth", "max_replays"], u64::from(DEFAULT_MAX_REPLAYS))?;
        Ok(u32::try_from(replays).unwrap_or(DEFAULT_MAX_REPLAYS))
    }

    fn set_auth_max_replays(&self, max_replays: u32) -> Result<()> {
        self.set_value(
            &["auth", "max_replays"],
            Value::Number(Number::from(max_replays)),
        )
    }

    fn get_auth_refresh_lead(&self) -> Result<chrono::Duration> {
        let secs = self.get_u64(
            &["auth", "refresh_lead_secs"],
            DEFAULT_REFRESH_LEAD_SECS as u64,
        )?;
        Ok(chrono::Duration::seconds(
            i64::try_from(secs).unwrap_or(DEFAULT_REFRESH_LEAD_SECS),
        ))
    }
}
