//! Environment helpers: centralized dotenv loading, ergonomic getters and the
//! process-wide [`Settings`] snapshot.
//! Call `init_env()` once early in each binary (or rely on lazy Once).
use std::str::FromStr;
use std::sync::Once;
use std::time::Duration;
use tracing::info;

use crate::normalization::currency::RateTable;

static INIT: Once = Once::new();

/// Load .env exactly once. Safe to call many times.
pub fn init_env() {
    INIT.call_once(|| {
        let _ = dotenv::dotenv();
    });
}

/// Get optional env var (None if unset or empty).
pub fn env_opt(key: &str) -> Option<String> {
    init_env();
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Get parsed value with default fallback.
pub fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    init_env();
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Boolean flag; accepts 1/true/on/yes (case-insensitive) as true.
pub fn env_flag(key: &str, default: bool) -> bool {
    init_env();
    match std::env::var(key) {
        Ok(raw) => {
            let v = raw.trim().to_ascii_lowercase();
            matches!(v.as_str(), "1" | "true" | "on" | "yes")
        }
        Err(_) => default,
    }
}

/// Comma separated list; items trimmed, empties dropped.
pub fn env_list(key: &str) -> Vec<String> {
    env_opt(key).map(|raw| split_list(&raw)).unwrap_or_default()
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Database DSN: `DATABASE_URL`, then `DB_URL`.
pub fn db_url() -> anyhow::Result<String> {
    for key in ["DATABASE_URL", "DB_URL"] {
        if let Some(v) = env_opt(key) {
            return Ok(v);
        }
    }
    Err(anyhow::anyhow!("no database URL env vars set"))
}

/// Configuration gathered once at process start and passed down explicitly.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: Option<String>,
    pub db_max_conns: u32,
    pub auto_migrate: bool,
    pub api_host: String,
    pub api_port: u16,
    pub allowed_origins: Vec<String>,
    pub scrape_top_n: usize,
    pub scrape_timeout: Duration,
    pub scrape_stores: Vec<String>,
    pub scrape_terms: Vec<String>,
    pub scrape_loop_every: Duration,
    pub rates: RateTable,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: None,
            db_max_conns: 10,
            auto_migrate: false,
            api_host: "0.0.0.0".to_string(),
            api_port: 8000,
            allowed_origins: Vec::new(),
            scrape_top_n: 3,
            scrape_timeout: Duration::from_secs(10),
            scrape_stores: vec!["steam".to_string(), "gog".to_string()],
            scrape_terms: Vec::new(),
            scrape_loop_every: Duration::from_secs(3600),
            rates: RateTable::default(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        init_env();
        let d = Settings::default();
        let scrape_stores = match env_list("SCRAPE_STORES") {
            v if v.is_empty() => d.scrape_stores,
            v => v,
        };
        let rates = match env_opt("FX_RATES_USD") {
            Some(raw) => d.rates.with_overrides(&raw),
            None => d.rates,
        };
        let settings = Settings {
            database_url: db_url().ok(),
            db_max_conns: env_parse("DB_MAX_CONNS", d.db_max_conns),
            auto_migrate: env_flag("AUTO_MIGRATE", d.auto_migrate),
            api_host: env_opt("API_HOST").unwrap_or(d.api_host),
            api_port: env_parse("API_PORT", d.api_port),
            allowed_origins: env_list("ALLOWED_ORIGINS"),
            scrape_top_n: env_parse("SCRAPE_TOP_N", d.scrape_top_n).max(1),
            scrape_timeout: Duration::from_secs(
                env_parse("SCRAPE_TIMEOUT_SECS", d.scrape_timeout.as_secs()).max(1),
            ),
            scrape_stores,
            scrape_terms: env_list("SCRAPE_TERMS"),
            scrape_loop_every: Duration::from_secs(
                env_parse("SCRAPE_LOOP_SECS", d.scrape_loop_every.as_secs()).max(1),
            ),
            rates,
        };
        info!(
            target = "env",
            db_configured = settings.database_url.is_some(),
            stores = ?settings.scrape_stores,
            top_n = settings.scrape_top_n,
            timeout_secs = settings.scrape_timeout.as_secs(),
            "settings loaded"
        );
        settings
    }

    /// The configured DSN, or an error naming the variables that were tried.
    pub fn require_database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("no database URL env vars set (DATABASE_URL, DB_URL)"))
    }
}
