//! Application configuration loaded from environment variables.

use std::time::Duration;

use saga::ReservationPolicy;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Process configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default `"0.0.0.0"`)
/// - `PORT`: listen port (default `3000`)
/// - `RUST_LOG`: tracing filter directive (default `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default `text`)
/// - `DATABASE_URL`: Postgres inventory ledger when set, in-memory otherwise
/// - `INSTANCE_ID`: member name in every consumer group (default `"api-1"`)
/// - `BUS_PARTITIONS`: partitions per topic (default `3`)
/// - `BUS_REDELIVERY_TIMEOUT_MS`: lease length before redelivery (default `30000`)
/// - `CONSUMER_POLL_TIMEOUT_MS`: longest wait of one poll (default `500`)
/// - `RESERVATION_POLICY`: `best_effort` or `all_or_nothing` (default `best_effort`)
/// - `RECONCILE_INTERVAL_SECS`: sweep period; the sweep is off when unset or `0`
/// - `RECONCILE_GRACE_SECS`: minimum order age the sweep considers (default `300`)
///
/// Unparseable values fall back to the default.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub instance_id: String,
    pub bus_partitions: u32,
    pub bus_redelivery_timeout: Duration,
    pub consumer_poll_timeout: Duration,
    pub reservation_policy: ReservationPolicy,
    pub reconcile_interval: Option<Duration>,
    pub reconcile_grace: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match lookup("LOG_FORMAT").as_deref().map(str::trim) {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            instance_id: lookup("INSTANCE_ID").unwrap_or(defaults.instance_id),
            bus_partitions: parsed("BUS_PARTITIONS")
                .and_then(|n| u32::try_from(n).ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.bus_partitions),
            bus_redelivery_timeout: parsed("BUS_REDELIVERY_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.bus_redelivery_timeout),
            consumer_poll_timeout: parsed("CONSUMER_POLL_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.consumer_poll_timeout),
            reservation_policy: lookup("RESERVATION_POLICY")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.reservation_policy),
            reconcile_interval: parsed("RECONCILE_INTERVAL_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            reconcile_grace: parsed("RECONCILE_GRACE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.reconcile_grace),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            instance_id: "api-1".to_string(),
            bus_partitions: 3,
            bus_redelivery_timeout: Duration::from_secs(30),
            consumer_poll_timeout: Duration::from_millis(500),
            reservation_policy: ReservationPolicy::BestEffort,
            reconcile_interval: None,
            reconcile_grace: Duration::from_secs(300),
        }
    }
}
