//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use checkout::{CheckoutConfig, IdempotencyMode, RetryPolicy};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: Postgres connection string; unset selects the in-memory store
/// - `PRODUCT_HOST`: catalog base URL (default: `"http://localhost:8081"`)
/// - `CATALOG_TIMEOUT_MS`: deadline per catalog lookup (default: `2000`)
/// - `IDEMPOTENCY_MODE`: `atomic` or `best_effort` (default: `atomic`)
/// - `PUBLISH_QUEUE_CAPACITY`: background publish queue size (default: `1024`)
/// - `BROKER_RETENTION`: messages retained per broker topic (default: `10000`)
/// - `CONSUMER_MAX_ATTEMPTS`: attempts per payment outcome (default: `3`)
/// - `CONSUMER_INITIAL_BACKOFF_MS`: first retry delay (default: `100`)
/// - `CONSUMER_DEAD_LETTER`: dead-letter exhausted messages (default: `true`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub product_host: String,
    pub catalog_timeout: Duration,
    pub idempotency_mode: IdempotencyMode,
    pub publish_queue_capacity: usize,
    pub broker_retention: usize,
    pub consumer_max_attempts: u32,
    pub consumer_initial_backoff: Duration,
    pub consumer_dead_letter: bool,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    ///
    /// Unparseable values fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = Parsed(&lookup);

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parsed.get("PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match lookup("LOG_FORMAT").as_deref() {
                Some(format) if format.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => defaults.log_format,
            },
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            product_host: lookup("PRODUCT_HOST").unwrap_or(defaults.product_host),
            catalog_timeout: parsed
                .get("CATALOG_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.catalog_timeout),
            idempotency_mode: lookup("IDEMPOTENCY_MODE")
                .and_then(|mode| IdempotencyMode::parse(&mode))
                .unwrap_or(defaults.idempotency_mode),
            publish_queue_capacity: parsed
                .get("PUBLISH_QUEUE_CAPACITY")
                .unwrap_or(defaults.publish_queue_capacity),
            broker_retention: parsed
                .get("BROKER_RETENTION")
                .unwrap_or(defaults.broker_retention),
            consumer_max_attempts: parsed
                .get("CONSUMER_MAX_ATTEMPTS")
                .unwrap_or(defaults.consumer_max_attempts),
            consumer_initial_backoff: parsed
                .get("CONSUMER_INITIAL_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.consumer_initial_backoff),
            consumer_dead_letter: parsed
                .get("CONSUMER_DEAD_LETTER")
                .unwrap_or(defaults.consumer_dead_letter),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the orchestrator settings.
    pub fn checkout_config(&self) -> CheckoutConfig {
        CheckoutConfig {
            catalog_timeout: self.catalog_timeout,
            idempotency_mode: self.idempotency_mode,
        }
    }

    /// Returns the payment-outcome retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(self.consumer_max_attempts)
            .with_initial_backoff(self.consumer_initial_backoff)
            .with_dead_letter(self.consumer_dead_letter)
    }
}

/// Typed view over a raw key lookup.
struct Parsed<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Parsed<'_, F> {
    fn get<T: FromStr>(&self, key: &str) -> Option<T> {
        (self.0)(key).and_then(|value| value.trim().parse().ok())
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
            product_host: "http://localhost:8081".to_string(),
            catalog_timeout: Duration::from_millis(2000),
            idempotency_mode: IdempotencyMode::Atomic,
            publish_queue_capacity: 1024,
            broker_retention: broker::memory::DEFAULT_RETENTION,
            consumer_max_attempts: 3,
            consumer_initial_backoff: Duration::from_millis(100),
            consumer_dead_letter: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.idempotency_mode, IdempotencyMode::Atomic);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_values_from_lookup() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "9090"),
            ("LOG_FORMAT", "JSON"),
            ("DATABASE_URL", "postgres://localhost/orders"),
            ("CATALOG_TIMEOUT_MS", "250"),
            ("IDEMPOTENCY_MODE", "best_effort"),
            ("CONSUMER_MAX_ATTEMPTS", "5"),
            ("BROKER_RETENTION", "50"),
            ("CONSUMER_DEAD_LETTER", "false"),
        ]));

        assert_eq!(config.port, 9090);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/orders")
        );
        assert_eq!(config.catalog_timeout, Duration::from_millis(250));
        assert_eq!(config.idempotency_mode, IdempotencyMode::BestEffort);
        assert_eq!(config.broker_retention, 50);

        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert!(!policy.dead_letter);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "not-a-port"),
            ("IDEMPOTENCY_MODE", "maybe"),
            ("DATABASE_URL", ""),
        ]));
        assert_eq!(config.port, 3000);
        assert_eq!(config.idempotency_mode, IdempotencyMode::Atomic);
        assert!(config.database_url.is_none());
    }
}
