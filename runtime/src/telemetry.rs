//! Tracing bootstrap.

use marketplace_fulfillment::MarketplaceConfig;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::util::TryInitError;

/// Installs the global `fmt` subscriber.
///
/// The filter comes from `RUST_LOG` when set, otherwise from
/// `config.log_level`.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init(config: &MarketplaceConfig) -> Result<(), TryInitError> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    tracing_subscriber::registry()
        .with(filter(config))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
}

fn filter(config: &MarketplaceConfig) -> EnvFilter {
    filter_from(std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref(), config)
}

/// Unset, empty or unparsable directives fall back to `config.log_level`.
fn filter_from(directives: Option<&str>, config: &MarketplaceConfig) -> EnvFilter {
    directives
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(&config.log_level))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured(level: &str) -> MarketplaceConfig {
        MarketplaceConfig {
            log_level: level.into(),
            ..MarketplaceConfig::default()
        }
    }

    #[test]
    fn falls_back_to_configured_level() {
        let config = configured("marketplace_runtime=debug");
        assert_eq!(filter_from(None, &config).to_string(), "marketplace_runtime=debug");
        assert_eq!(filter_from(Some("  "), &config).to_string(), "marketplace_runtime=debug");
    }

    #[test]
    fn rust_log_wins_over_config() {
        let config = configured("info");
        assert_eq!(filter_from(Some("warn"), &config).to_string(), "warn");
    }
}
