//! Application settings objects and initialization.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

const ENV_PREFIX: &str = "PGWATCH";

/// Settings consumed directly by the metric-ingestion core. The
/// config-store connection string and preset-bundle options are included
/// here because the connection-pool factory builds a pool to
/// both the config store and the metric store, even though everything else
/// about the config store is an external collaborator to this core.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// One or more metric-store connection strings; each creates an
    /// independent sink.
    pub metric_store_database_urls: Vec<String>,
    /// Config-store connection string (external collaborator; only the
    /// connection-pool factory in this core touches it).
    pub config_store_database_url: Option<String>,

    pub database_pool_max_size: u32,
    /// Pool timeout when waiting for a slot to become available, in seconds.
    pub database_pool_connection_timeout_secs: u32,
    /// Max time a connection may sit idle before being dropped, in seconds.
    pub database_pool_connection_max_idle_secs: u32,
    /// Max age a given connection should live, in seconds.
    pub database_pool_connection_lifespan_secs: u32,
    /// Attempts for the bounded-retry bootstrap connect.
    pub database_pool_bootstrap_retries: u32,
    pub database_pool_bootstrap_retry_delay_ms: u64,

    /// Maximum time a partial batch buffer waits before flush.
    pub batching_delay_ms: u64,

    /// Plain-Postgres retention threshold, in days; `<= 0` disables pruning.
    pub retention_days: i32,

    pub statsd_host: Option<String>,
    pub statsd_port: u16,
    pub statsd_label: String,

    /// Human-readable terminal logs (false) vs. MozLog-style JSON (true).
    pub log_json: bool,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            metric_store_database_urls: vec![
                "postgres://postgres@127.0.0.1/pgwatch3_metrics".to_string(),
            ],
            config_store_database_url: None,
            database_pool_max_size: 10,
            database_pool_connection_timeout_secs: 5,
            database_pool_connection_max_idle_secs: 15,
            database_pool_connection_lifespan_secs: 30 * 60,
            database_pool_bootstrap_retries: 3,
            database_pool_bootstrap_retry_delay_ms: 1_000,
            batching_delay_ms: 250,
            retention_days: 90,
            statsd_host: None,
            statsd_port: 8125,
            statsd_label: "pgwatch3".to_string(),
            log_json: false,
        }
    }
}

impl Settings {
    /// Loads settings from (in ascending priority) a `pgwatch3.toml` in the
    /// working directory, then `PGWATCH_*` environment variables, falling
    /// back to [`Settings::default`] for anything unset.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name("pgwatch3").required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));
        builder.build()?.try_deserialize()
    }

    pub fn retention_enabled(&self) -> bool {
        self.retention_days > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let s = Settings::default();
        assert_eq!(s.batching_delay_ms, 250);
        assert!(s.retention_enabled());
        assert_eq!(s.database_pool_connection_timeout_secs, 5);
    }

    #[test]
    fn retention_disabled_at_zero_or_below() {
        let mut s = Settings::default();
        s.retention_days = 0;
        assert!(!s.retention_enabled());
        s.retention_days = -1;
        assert!(!s.retention_enabled());
    }
}
