use pmoconfig::Config;
use tracing::Level;
use tracing_subscriber::{
    EnvFilter, Registry, filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

fn string_to_level(s: &str) -> Option<Level> {
    match s.trim().to_uppercase().as_str() {
        "ERROR" => Some(Level::ERROR),
        "WARN" | "WARNING" => Some(Level::WARN),
        "INFO" => Some(Level::INFO),
        "DEBUG" => Some(Level::DEBUG),
        "TRACE" => Some(Level::TRACE),
        _ => None,
    }
}

/// Installs the global subscriber
///
/// `RUST_LOG` wins when set; otherwise the level comes from `override_level`
/// or `host.logger.min_level`. Logs go to stderr so stdout stays JSON.
pub fn init_logging(config: &Config, override_level: Option<&str>) {
    let configured = match override_level {
        Some(level) => level.to_string(),
        None => config
            .get_log_min_level()
            .unwrap_or_else(|_| "INFO".to_string()),
    };
    let level = string_to_level(&configured)
        .map(LevelFilter::from_level)
        .unwrap_or(LevelFilter::INFO);

    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let subscriber = Registry::default().with(filter);

    if config.get_log_enable_console().unwrap_or(true) {
        subscriber
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true),
            )
            .init();
    } else {
        subscriber.init();
    }
}
