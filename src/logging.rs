use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

/// Filter used by every binary when `RUST_LOG` is unset. html5ever and
/// selectors (via `scraper`) warn on every malformed store page, so they sit
/// at error; sqlx statement logs sit at warn.
pub const DEFAULT_FILTER: &str = "info,sqlx=warn,html5ever=error,selectors=error";

/// Install the global fmt subscriber with file and line on every event.
/// `RUST_LOG` wins over `default_filter`, so one noisy store can be traced
/// with e.g. `RUST_LOG=gamepulse::database_ops::storefront=debug`.
pub fn init_tracing(default_filter: &str) -> Result<(), anyhow::Error> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .map_err(|e| anyhow::anyhow!("invalid log filter {default_filter:?}: {e}"))?;

    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("tracing subscriber already installed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }
}
