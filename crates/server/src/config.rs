//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use accrual::{CircuitBreakerConfig, HttpClientConfig};
use clap::Parser;
use ledger::PoolSettings;
use reconciler::WorkerConfig;

use crate::error::{Result, ServerError};

/// Command-line overrides for the required settings.
#[derive(Parser, Debug, Default, Clone)]
#[command(name = "loyalty-server", version, about = "Loyalty ledger reconciliation service")]
pub struct Flags {
    /// Service run address (overrides RUN_ADDRESS)
    #[arg(short = 'a')]
    pub run_address: Option<String>,

    /// Database URI (overrides DATABASE_URI)
    #[arg(short = 'd')]
    pub database_uri: Option<String>,

    /// Accrual system address (overrides ACCRUAL_SYSTEM_ADDRESS)
    #[arg(short = 'r')]
    pub accrual_address: Option<String>,
}

impl Flags {
    /// The flag value standing in for environment variable `key`, if set.
    fn get(&self, key: &str) -> Option<String> {
        let value = match key {
            "RUN_ADDRESS" => &self.run_address,
            "DATABASE_URI" => &self.database_uri,
            "ACCRUAL_SYSTEM_ADDRESS" => &self.accrual_address,
            _ => return None,
        };
        value.clone().filter(|v| !v.trim().is_empty())
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Process configuration.
///
/// Reads from environment variables:
/// - `RUN_ADDRESS`: full bind address, overrides `HOST`/`PORT` (e.g. `:8080`)
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `8080`)
/// - `DATABASE_URI`: PostgreSQL connection string (required)
/// - `ACCRUAL_SYSTEM_ADDRESS`: accrual service base URL (required)
/// - `DB_MAX_CONNECTIONS`: pool size (default: `100`)
/// - `SHUTDOWN_GRACE_SECS`: time the worker gets to drain (default: `10`)
/// - `LOG_FORMAT`: `json` for JSON logs, anything else for text
/// - `ACCRUAL_POLL_INTERVAL_MS`, `ACCRUAL_POOL_SIZE`, `ACCRUAL_REQUEST_DELAY_MS`,
///   `LEDGER_TIMEOUT_MS`, `ACCRUAL_RETRY_AFTER_MIN_SECS`: worker tunables
/// - `BREAKER_FAILURE_THRESHOLD`, `BREAKER_COOLDOWN_SECS`, `BREAKER_TRIAL_COUNT`:
///   circuit breaker tunables
///
/// `-a`, `-d` and `-r` on the command line take precedence over
/// `RUN_ADDRESS`, `DATABASE_URI` and `ACCRUAL_SYSTEM_ADDRESS`.
///
/// Unparsable optional values fall back to their defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub run_address: Option<String>,
    pub database_uri: String,
    pub accrual_address: String,
    pub db_max_connections: u32,
    pub shutdown_grace: Duration,
    pub log_format: LogFormat,
    pub worker: WorkerConfig,
    pub breaker: CircuitBreakerConfig,
}

impl Config {
    /// Loads configuration from the command line and the process environment.
    pub fn from_args_and_env() -> Result<Self> {
        Self::from_sources(&Flags::parse(), |key| std::env::var(key).ok())
    }

    /// Loads configuration from `flags`, falling back to `lookup`.
    pub fn from_sources(flags: &Flags, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Self::from_lookup(|key| flags.get(key).or_else(|| lookup(key)))
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let vars = Vars(lookup);
        let get = |key: &str| vars.get(key);

        let database_uri = get("DATABASE_URI").ok_or(ServerError::MissingConfig("DATABASE_URI"))?;
        let accrual_address = get("ACCRUAL_SYSTEM_ADDRESS")
            .ok_or(ServerError::MissingConfig("ACCRUAL_SYSTEM_ADDRESS"))?;

        let defaults = WorkerConfig::default();
        let worker = WorkerConfig::new()
            .with_poll_interval(
                vars.parse("ACCRUAL_POLL_INTERVAL_MS")
                    .map_or(defaults.poll_interval, Duration::from_millis),
            )
            .with_pool_size(vars.parse("ACCRUAL_POOL_SIZE").unwrap_or(defaults.pool_size))
            .with_request_delay(
                vars.parse("ACCRUAL_REQUEST_DELAY_MS")
                    .map_or(defaults.request_delay, Duration::from_millis),
            )
            .with_ledger_timeout(
                vars.parse("LEDGER_TIMEOUT_MS").map_or(defaults.ledger_timeout, Duration::from_millis),
            )
            .with_retry_after_min(
                vars.parse("ACCRUAL_RETRY_AFTER_MIN_SECS")
                    .map_or(defaults.retry_after_min, Duration::from_secs),
            );

        let breaker_defaults = CircuitBreakerConfig::default();
        let breaker = CircuitBreakerConfig::new("accrual")
            .with_failure_threshold(
                vars.parse("BREAKER_FAILURE_THRESHOLD").unwrap_or(breaker_defaults.failure_threshold),
            )
            .with_cooldown(
                vars.parse("BREAKER_COOLDOWN_SECS").map_or(breaker_defaults.cooldown, Duration::from_secs),
            )
            .with_trial_count(vars.parse("BREAKER_TRIAL_COUNT").unwrap_or(breaker_defaults.trial_count));

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: vars.parse("PORT").unwrap_or(8080),
            run_address: get("RUN_ADDRESS"),
            database_uri,
            accrual_address,
            db_max_connections: vars.parse("DB_MAX_CONNECTIONS")
                .unwrap_or(PoolSettings::default().max_connections),
            shutdown_grace: Duration::from_secs(vars.parse("SHUTDOWN_GRACE_SECS").unwrap_or(10)),
            log_format: match get("LOG_FORMAT") {
                Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            worker,
            breaker,
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        match &self.run_address {
            Some(addr) if addr.starts_with(':') => format!("0.0.0.0{addr}"),
            Some(addr) => addr.clone(),
            None => format!("{}:{}", self.host, self.port),
        }
    }

    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            max_connections: self.db_max_connections.max(1),
            ..PoolSettings::default()
        }
    }

    pub fn http_client(&self) -> HttpClientConfig {
        HttpClientConfig::new(self.accrual_address.clone())
    }
}

/// Environment lookup that treats blank values as unset.
struct Vars<F>(F);

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn parse<T: FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    const REQUIRED: [(&str, &str); 2] = [
        ("DATABASE_URI", "postgres://localhost/loyalty"),
        ("ACCRUAL_SYSTEM_ADDRESS", "http://accrual:8080"),
    ];

    #[test]
    fn test_default_values() {
        let config = load(&REQUIRED).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.addr(), "0.0.0.0:8080");
        assert_eq!(config.db_max_connections, 100);
        assert_eq!(config.shutdown_grace, Duration::from_secs(10));
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.worker, WorkerConfig::default());
        assert_eq!(config.breaker.failure_threshold, 5);
        assert_eq!(config.breaker.cooldown, Duration::from_secs(30));
        assert_eq!(config.breaker.trial_count, 3);
    }

    #[test]
    fn test_missing_required_values() {
        let err = load(&[("ACCRUAL_SYSTEM_ADDRESS", "http://accrual")]).unwrap_err();
        assert!(matches!(err, ServerError::MissingConfig("DATABASE_URI")));

        let err = load(&[("DATABASE_URI", "postgres://x"), ("ACCRUAL_SYSTEM_ADDRESS", " ")])
            .unwrap_err();
        assert!(matches!(err, ServerError::MissingConfig("ACCRUAL_SYSTEM_ADDRESS")));
    }

    #[test]
    fn test_overrides() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("PORT", "9000"),
            ("HOST", "127.0.0.1"),
            ("ACCRUAL_POOL_SIZE", "8"),
            ("ACCRUAL_POLL_INTERVAL_MS", "250"),
            ("ACCRUAL_RETRY_AFTER_MIN_SECS", "5"),
            ("BREAKER_FAILURE_THRESHOLD", "2"),
            ("SHUTDOWN_GRACE_SECS", "3"),
            ("LOG_FORMAT", "JSON"),
        ]);
        let config = load(&pairs).unwrap();

        assert_eq!(config.addr(), "127.0.0.1:9000");
        assert_eq!(config.worker.pool_size, 8);
        assert_eq!(config.worker.poll_interval, Duration::from_millis(250));
        assert_eq!(config.worker.retry_after_min, Duration::from_secs(5));
        assert_eq!(config.breaker.failure_threshold, 2);
        assert_eq!(config.shutdown_grace, Duration::from_secs(3));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_unparsable_values_fall_back() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([("PORT", "http"), ("ACCRUAL_POOL_SIZE", "-1")]);
        let config = load(&pairs).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.worker.pool_size, 5);
    }

    #[test]
    fn test_flags_override_environment() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("RUN_ADDRESS", ":1111"));
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let flags = Flags::parse_from([
            "loyalty-server",
            "-a",
            "localhost:9999",
            "-r",
            "http://other-accrual:8080",
        ]);
        let config = Config::from_sources(&flags, |key| env.get(key).cloned()).unwrap();

        assert_eq!(config.addr(), "localhost:9999");
        assert_eq!(config.accrual_address, "http://other-accrual:8080");
        assert_eq!(config.database_uri, "postgres://localhost/loyalty");
    }

    #[test]
    fn test_flag_supplies_missing_required_value() {
        let flags = Flags::parse_from(["loyalty-server", "-d", "postgres://flag/loyalty"]);
        let config = Config::from_sources(&flags, |key| {
            (key == "ACCRUAL_SYSTEM_ADDRESS").then(|| "http://accrual".to_string())
        })
        .unwrap();
        assert_eq!(config.database_uri, "postgres://flag/loyalty");

        let empty = Flags::parse_from(["loyalty-server", "-d", ""]);
        let err = Config::from_sources(&empty, |key| {
            (key == "ACCRUAL_SYSTEM_ADDRESS").then(|| "http://accrual".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ServerError::MissingConfig("DATABASE_URI")));
    }

    #[test]
    fn test_run_address_overrides_host_and_port() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([("RUN_ADDRESS", ":1111"), ("PORT", "9000")]);
        assert_eq!(load(&pairs).unwrap().addr(), "0.0.0.0:1111");

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("RUN_ADDRESS", "localhost:2222"));
        assert_eq!(load(&pairs).unwrap().addr(), "localhost:2222");
    }
}
