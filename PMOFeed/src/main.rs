mod cli;
mod logs;

use anyhow::{Context, Result, bail};
use clap::Parser;
use cli::{Args, Command};
use pmoconfig::{Config, get_config};
use pmofeed::{Credential, LoaderEvent, TokenRefreshCoordinator};
use pmoproviders::{Provider, ProviderConfigExt};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(dir) => Arc::new(Config::load_config(dir)?),
        None => get_config(),
    };
    logs::init_logging(&config, args.log_level.as_deref());

    match args.command {
        Command::Providers => list_providers(&config),
        Command::Fetch {
            provider,
            pages,
            page_size,
        } => fetch(&config, provider, pages, page_size).await,
        Command::Refresh { provider } => refresh(&config, provider).await,
        Command::Login {
            provider,
            access_token,
            refresh_token,
            expires_in,
            client_id,
            client_secret,
        } => {
            let mut credential = Credential::new(access_token, refresh_token);
            if let Some(secs) = expires_in {
                credential =
                    credential.with_expiry(chrono::Utc::now() + chrono::Duration::seconds(secs));
            }
            config.set_provider_credential(provider, &credential)?;
            if let Some(client_id) = client_id {
                config.set_string(&["providers", provider.name(), "client_id"], &client_id)?;
            }
            if let Some(secret) = client_secret {
                config.set_provider_client_secret(provider, &secret)?;
            }
            info!(provider = %provider, "Credential stored in {}", config.directory());
            Ok(())
        }
    }
}

fn list_providers(config: &Config) -> Result<()> {
    for provider in Provider::ALL {
        let enabled = config.get_provider_enabled(provider)?;
        let url = config.get_provider_url(provider).unwrap_or_default();
        let auth = if !provider.requires_oauth() {
            "no auth"
        } else if config.get_provider_credential(provider).is_ok() {
            "logged in"
        } else {
            "no credential"
        };
        println!(
            "{:<11} {:<8} {:<14} {}",
            provider.name(),
            if enabled { "enabled" } else { "disabled" },
            auth,
            url
        );
    }
    Ok(())
}

async fn fetch(
    config: &Config,
    provider: Provider,
    max_pages: Option<usize>,
    page_size: Option<u64>,
) -> Result<()> {
    let mut session = config
        .build_provider_session(provider)
        .with_context(|| format!("Cannot set up {}", provider))?;
    if let Some(page_size) = page_size {
        session = session.with_page_size(page_size);
    }
    let initial_generation = session.coordinator().map(TokenRefreshCoordinator::generation);

    let loader = session.loader::<serde_json::Value>();
    let mut events = loader.subscribe();

    let mut pages = 0;
    while max_pages.is_none_or(|max| pages < max) && loader.fetch_next().is_started() {
        match settle(&mut events).await? {
            LoaderEvent::CompleteLoading { appended, has_more } => {
                pages += 1;
                info!(page = pages, appended, has_more, "Page loaded");
            }
            LoaderEvent::FailToLoad { reason } => {
                persist_if_refreshed(config, provider, session.coordinator(), initial_generation);
                bail!("Failed to load page {} from {}: {}", pages + 1, provider, reason);
            }
            LoaderEvent::StartLoading => {}
        }
    }

    for item in loader.items() {
        println!("{}", serde_json::to_string(&item)?);
    }
    info!(provider = %provider, pages, items = loader.len(), "Done");

    persist_if_refreshed(config, provider, session.coordinator(), initial_generation);
    Ok(())
}

async fn refresh(config: &Config, provider: Provider) -> Result<()> {
    let coordinator = config.build_token_coordinator(provider)?;
    let generation = coordinator.refresh().await?;
    config.set_provider_credential(provider, &coordinator.credential())?;
    info!(provider = %provider, generation, "Access token refreshed");
    Ok(())
}

/// Waits for the event closing the fetch in flight
async fn settle(events: &mut broadcast::Receiver<LoaderEvent>) -> Result<LoaderEvent> {
    loop {
        match events.recv().await {
            Ok(LoaderEvent::StartLoading) => continue,
            Ok(event) => return Ok(event),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Loader events skipped");
            }
            Err(RecvError::Closed) => bail!("Loader event channel closed"),
        }
    }
}

/// Writes rotated tokens back to the configuration
fn persist_if_refreshed(
    config: &Config,
    provider: Provider,
    coordinator: Option<&TokenRefreshCoordinator>,
    initial_generation: Option<u64>,
) {
    let Some(coordinator) = coordinator else {
        return;
    };
    if Some(coordinator.generation()) == initial_generation {
        return;
    }
    match config.set_provider_credential(provider, &coordinator.credential()) {
        Ok(()) => info!(provider = %provider, "Refreshed credential saved"),
        Err(e) => warn!(provider = %provider, "Failed to save refreshed credential: {}", e),
    }
}
