//! Scheduler configuration.

use std::str::FromStr;
use std::time::Duration;

use pricesync_common::constants;
use pricesync_common::ProviderName;
use pricesync_fx::{bluelytics, dolarapi, BluelyticsMarket};

/// Which store backend the binary runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    /// Process-local, lost on exit.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store backend '{}'", other)),
        }
    }
}

/// Rate provider configuration.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Provider tried first. The other one is the fallback.
    pub primary: ProviderName,
    pub dolarapi_url: String,
    /// dolarapi "casa" (blue, oficial, bolsa, ...).
    pub dolarapi_casa: String,
    pub bluelytics_url: String,
    pub bluelytics_market: BluelyticsMarket,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            primary: ProviderName::DolarApi,
            dolarapi_url: dolarapi::DEFAULT_BASE_URL.to_string(),
            dolarapi_casa: "blue".to_string(),
            bluelytics_url: bluelytics::DEFAULT_BASE_URL.to_string(),
            bluelytics_market: BluelyticsMarket::Blue,
            request_timeout: constants::provider_request_timeout(),
        }
    }
}

/// Main scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between scheduled refreshes.
    pub refresh_interval: Duration,
    pub store: StoreBackend,
    /// Database URL, required for the Postgres backend.
    pub database_url: String,
    pub providers: ProviderConfig,
    /// How long `stop` waits for the loop to finish.
    pub shutdown_grace: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            refresh_interval: constants::default_refresh_interval(),
            store: StoreBackend::Postgres,
            database_url: "postgres://localhost/pricesync".to_string(),
            providers: ProviderConfig::default(),
            shutdown_grace: constants::shutdown_grace_period(),
        }
    }
}

impl SchedulerConfig {
    /// Load configuration from environment variables.
    ///
    /// Unparseable values keep their defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database_url = url;
        }

        if let Some(store) = parsed_var("PRICESYNC_STORE") {
            config.store = store;
        }

        if let Some(secs) = parsed_var::<u64>("PRICESYNC_REFRESH_INTERVAL_SECS") {
            config.refresh_interval = Duration::from_secs(secs);
        }

        if let Some(primary) = parsed_var("PRICESYNC_PRIMARY_PROVIDER") {
            config.providers.primary = primary;
        }

        if let Ok(url) = std::env::var("PRICESYNC_DOLARAPI_URL") {
            config.providers.dolarapi_url = url;
        }

        if let Ok(casa) = std::env::var("PRICESYNC_DOLARAPI_CASA") {
            config.providers.dolarapi_casa = casa;
        }

        if let Ok(url) = std::env::var("PRICESYNC_BLUELYTICS_URL") {
            config.providers.bluelytics_url = url;
        }

        if let Some(market) = parsed_var("PRICESYNC_BLUELYTICS_MARKET") {
            config.providers.bluelytics_market = market;
        }

        if let Some(secs) = parsed_var::<u64>("PRICESYNC_HTTP_TIMEOUT_SECS") {
            config.providers.request_timeout = Duration::from_secs(secs);
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.refresh_interval < constants::min_refresh_interval() {
            return Err(format!(
                "Refresh interval must be at least {:?}",
                constants::min_refresh_interval()
            ));
        }

        if self.store == StoreBackend::Postgres && self.database_url.is_empty() {
            return Err("Database URL cannot be empty".to_string());
        }

        if self.providers.request_timeout.is_zero() {
            return Err("HTTP timeout cannot be 0".to_string());
        }

        if self.providers.request_timeout >= self.refresh_interval {
            return Err("HTTP timeout must be shorter than the refresh interval".to_string());
        }

        if self.providers.dolarapi_casa.is_empty() {
            return Err("dolarapi casa cannot be empty".to_string());
        }

        Ok(())
    }
}

fn parsed_var<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
