//! Configuration loading and management.
//!
//! This module provides layered configuration for the exporter using figment.
//! Configuration is loaded from (in order of priority):
//! 1. Default values (compiled in)
//! 2. Config file: `/etc/nrevent-exporter/config.toml` (optional)
//! 3. Standard environment variables
//! 4. Exporter-specific environment variables (`NREVENT_*`)
//!
//! # Supported Standard Environment Variables
//!
//! | Variable | Config Path | Description |
//! |----------|-------------|-------------|
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | `exporter.endpoint` | Base endpoint URL |
//! | `OTEL_EXPORTER_OTLP_METRICS_ENDPOINT` | `exporter.metrics_endpoint` | Full metrics URL |
//! | `NEW_RELIC_API_KEY` | `exporter.api_key` | Ingest API key |
//!
//! Exporter-specific variables use `__` to separate nesting levels, for
//! example `NREVENT_EXPORTER__API_KEY` or `NREVENT_RETRY__ENABLED`.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

const DEFAULT_CONFIG_PATH: &str = "/etc/nrevent-exporter/config.toml";
const ENV_PREFIX: &str = "NREVENT_";
const DEFAULT_EVENT_TYPE: &str = "OtelMetric";
const METRICS_SIGNAL: &str = "metrics";
const SIGNAL_VERSION: &str = "v1";

/// Errors raised while validating configuration.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Neither a base endpoint nor a metrics endpoint was configured.
    #[error("either endpoint or metrics_endpoint must be specified")]
    MissingEndpoint,

    /// A configured endpoint is not a valid URL.
    #[error("{field} must be a valid URL")]
    InvalidUrl {
        /// Name of the offending configuration field.
        field: &'static str,
        /// Underlying parse failure.
        #[source]
        source: url::ParseError,
    },
}

/// Main configuration struct for the exporter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Event API exporter configuration.
    pub exporter: ExporterConfig,
    /// Retry behaviour of the owning layer.
    pub retry: RetryConfig,
}

impl Config {
    /// Loads configuration from all sources, using the default config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    #[allow(clippy::result_large_err)]
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Loads configuration from a custom config file path.
    ///
    /// A missing file is not an error; the remaining layers still apply.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    #[allow(clippy::result_large_err)]
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        if config_path.as_ref().exists() {
            figment = figment.merge(Toml::file(config_path));
        }

        figment = figment.merge(standard_env());
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        figment.extract()
    }

    /// Creates a new config builder for testing.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Event API exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    /// Base endpoint; `/v1/metrics` is appended when no metrics endpoint is set.
    pub endpoint: Option<String>,
    /// Full URL metrics are posted to. Takes precedence over `endpoint`.
    pub metrics_endpoint: Option<String>,
    /// Key sent in the `Api-Key` header.
    pub api_key: String,
    /// Value of the `eventType` attribute on every emitted event.
    pub event_type: String,
    /// HTTP client timeout in milliseconds.
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            metrics_endpoint: None,
            api_key: String::new(),
            event_type: DEFAULT_EVENT_TYPE.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl ExporterConfig {
    /// Composes the URL metrics are posted to.
    ///
    /// An explicit `metrics_endpoint` is used verbatim. Otherwise the signal
    /// path is appended to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when no endpoint is configured or the
    /// resulting URL does not parse.
    pub fn metrics_url(&self) -> Result<String, ConfigError> {
        compose_signal_url(
            self.endpoint.as_deref(),
            self.metrics_endpoint.as_deref(),
            "metrics_endpoint",
            METRICS_SIGNAL,
        )
    }
}

fn compose_signal_url(
    endpoint: Option<&str>,
    signal_override: Option<&str>,
    override_field: &'static str,
    signal_name: &str,
) -> Result<String, ConfigError> {
    match (signal_override, endpoint) {
        (Some(url), _) if !url.is_empty() => {
            Url::parse(url).map_err(|source| ConfigError::InvalidUrl {
                field: override_field,
                source,
            })?;
            Ok(url.to_string())
        }
        (_, Some(base)) if !base.is_empty() => {
            let url = if base.ends_with('/') {
                format!("{base}{SIGNAL_VERSION}/{signal_name}")
            } else {
                format!("{base}/{SIGNAL_VERSION}/{signal_name}")
            };
            Url::parse(&url).map_err(|source| ConfigError::InvalidUrl {
                field: "endpoint",
                source,
            })?;
            Ok(url)
        }
        _ => Err(ConfigError::MissingEndpoint),
    }
}

/// Retry configuration for the layer that owns the retry loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Whether failed retryable exports are retried at all.
    pub enabled: bool,
    /// Delay before the first retry, in milliseconds.
    #[serde(with = "duration_ms")]
    pub initial_interval: Duration,
    /// Upper bound on the backoff delay, in milliseconds.
    #[serde(with = "duration_ms")]
    pub max_interval: Duration,
    /// Total time budget across all attempts, in milliseconds.
    #[serde(with = "duration_ms")]
    pub max_elapsed_time: Duration,
    /// Backoff growth factor between attempts.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_interval: Duration::from_secs(5),
            max_interval: Duration::from_secs(30),
            max_elapsed_time: Duration::from_secs(300),
            multiplier: 1.5,
        }
    }
}

/// Builder for constructing configuration programmatically.
#[must_use = "builders do nothing unless .build() is called"]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Creates a new config builder with default values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Sets the base endpoint.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.exporter.endpoint = Some(endpoint.into());
        self
    }

    /// Sets the full metrics endpoint.
    pub fn metrics_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.exporter.metrics_endpoint = Some(endpoint.into());
        self
    }

    /// Sets the API key.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.exporter.api_key = key.into();
        self
    }

    /// Sets the event type label.
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.config.exporter.event_type = event_type.into();
        self
    }

    /// Sets the HTTP client timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.exporter.timeout = timeout;
        self
    }

    /// Enables or disables retries.
    pub fn retry_enabled(mut self, enabled: bool) -> Self {
        self.config.retry.enabled = enabled;
        self
    }

    /// Sets the initial and maximum backoff intervals.
    pub fn retry_intervals(mut self, initial: Duration, max: Duration) -> Self {
        self.config.retry.initial_interval = initial;
        self.config.retry.max_interval = max;
        self
    }

    /// Sets the total retry time budget.
    pub fn retry_max_elapsed_time(mut self, max_elapsed: Duration) -> Self {
        self.config.retry.max_elapsed_time = max_elapsed;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Partial exporter config for standard env var overrides.
#[derive(Debug, Default, Serialize)]
struct PartialExporterConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metrics_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<String>,
}

/// Partial config for standard env var overrides.
#[derive(Debug, Default, Serialize)]
struct PartialConfig {
    #[serde(skip_serializing_if = "is_partial_exporter_empty")]
    exporter: PartialExporterConfig,
}

fn is_partial_exporter_empty(config: &PartialExporterConfig) -> bool {
    config.endpoint.is_none() && config.metrics_endpoint.is_none() && config.api_key.is_none()
}

fn standard_env() -> Serialized<PartialConfig> {
    let mut config = PartialConfig::default();

    if let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
        config.exporter.endpoint = Some(endpoint);
    }

    if let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_METRICS_ENDPOINT") {
        config.exporter.metrics_endpoint = Some(endpoint);
    }

    if let Ok(key) = std::env::var("NEW_RELIC_API_KEY") {
        config.exporter.api_key = Some(key);
    }

    Serialized::defaults(config)
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const NO_ENV: [(&str, Option<&str>); 3] = [
        ("OTEL_EXPORTER_OTLP_ENDPOINT", None),
        ("OTEL_EXPORTER_OTLP_METRICS_ENDPOINT", None),
        ("NEW_RELIC_API_KEY", None),
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.exporter.endpoint.is_none());
        assert!(config.exporter.metrics_endpoint.is_none());
        assert!(config.exporter.api_key.is_empty());
        assert_eq!(config.exporter.event_type, "OtelMetric");
        assert_eq!(config.exporter.timeout, Duration::from_secs(30));

        assert!(config.retry.enabled);
        assert_eq!(config.retry.initial_interval, Duration::from_secs(5));
        assert_eq!(config.retry.max_interval, Duration::from_secs(30));
        assert_eq!(config.retry.max_elapsed_time, Duration::from_secs(300));
    }

    #[test]
    fn test_config_builder() {
        let config = Config::builder()
            .endpoint("https://collector:4318")
            .api_key("secret")
            .event_type("MyMetric")
            .timeout(Duration::from_millis(1000))
            .retry_enabled(false)
            .retry_intervals(Duration::from_millis(10), Duration::from_millis(100))
            .retry_max_elapsed_time(Duration::from_secs(1))
            .build();

        assert_eq!(
            config.exporter.endpoint,
            Some("https://collector:4318".to_string())
        );
        assert_eq!(config.exporter.api_key, "secret");
        assert_eq!(config.exporter.event_type, "MyMetric");
        assert_eq!(config.exporter.timeout, Duration::from_millis(1000));
        assert!(!config.retry.enabled);
        assert_eq!(config.retry.initial_interval, Duration::from_millis(10));
        assert_eq!(config.retry.max_interval, Duration::from_millis(100));
        assert_eq!(config.retry.max_elapsed_time, Duration::from_secs(1));
    }

    #[test]
    fn test_metrics_url_appends_signal_path() {
        let config = Config::builder().endpoint("https://collector:4318").build();
        assert_eq!(
            config.exporter.metrics_url().unwrap(),
            "https://collector:4318/v1/metrics"
        );

        let config = Config::builder().endpoint("https://collector:4318/").build();
        assert_eq!(
            config.exporter.metrics_url().unwrap(),
            "https://collector:4318/v1/metrics"
        );
    }

    #[test]
    fn test_metrics_endpoint_takes_precedence() {
        let config = Config::builder()
            .endpoint("https://collector:4318")
            .metrics_endpoint("https://insights-collector.example.com/v1/accounts/1/events")
            .build();

        assert_eq!(
            config.exporter.metrics_url().unwrap(),
            "https://insights-collector.example.com/v1/accounts/1/events"
        );
    }

    #[test]
    fn test_missing_endpoint_is_rejected() {
        let err = ExporterConfig::default().metrics_url().unwrap_err();
        assert!(matches!(err, ConfigError::MissingEndpoint));
        assert_eq!(
            err.to_string(),
            "either endpoint or metrics_endpoint must be specified"
        );
    }

    #[test]
    fn test_invalid_metrics_endpoint_is_rejected() {
        let config = Config::builder().metrics_endpoint("not a url").build();
        let err = config.exporter.metrics_url().unwrap_err();

        assert!(matches!(
            err,
            ConfigError::InvalidUrl {
                field: "metrics_endpoint",
                ..
            }
        ));
        assert_eq!(err.to_string(), "metrics_endpoint must be a valid URL");
    }

    #[test]
    #[serial]
    fn test_load_from_toml() {
        let toml_content = r#"
[exporter]
endpoint = "https://test-collector:4318"
api_key = "from-file"
event_type = "FileMetric"
timeout = 1000

[retry]
enabled = false
initial_interval = 250
max_elapsed_time = 2000
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        temp_env::with_vars(NO_ENV, || {
            let config = Config::load_from_path(temp_file.path()).unwrap();

            assert_eq!(
                config.exporter.endpoint,
                Some("https://test-collector:4318".to_string())
            );
            assert_eq!(config.exporter.api_key, "from-file");
            assert_eq!(config.exporter.event_type, "FileMetric");
            assert_eq!(config.exporter.timeout, Duration::from_millis(1000));
            assert!(!config.retry.enabled);
            assert_eq!(config.retry.initial_interval, Duration::from_millis(250));
            assert_eq!(config.retry.max_elapsed_time, Duration::from_secs(2));
            assert_eq!(config.retry.max_interval, Duration::from_secs(30));
        });
    }

    #[test]
    #[serial]
    fn test_load_nonexistent_file_uses_defaults() {
        temp_env::with_vars(NO_ENV, || {
            let config = Config::load_from_path("/nonexistent/path/config.toml").unwrap();

            assert!(config.exporter.endpoint.is_none());
            assert_eq!(config.exporter.event_type, "OtelMetric");
        });
    }

    #[test]
    #[serial]
    fn test_standard_env_overrides_defaults() {
        temp_env::with_vars(
            [
                ("OTEL_EXPORTER_OTLP_ENDPOINT", Some("https://env-collector:4318")),
                ("OTEL_EXPORTER_OTLP_METRICS_ENDPOINT", None),
                ("NEW_RELIC_API_KEY", Some("env-key")),
            ],
            || {
                let config = Config::load_from_path("/nonexistent/path/config.toml").unwrap();

                assert_eq!(
                    config.exporter.endpoint,
                    Some("https://env-collector:4318".to_string())
                );
                assert_eq!(config.exporter.api_key, "env-key");
            },
        );
    }

    #[test]
    #[serial]
    fn test_prefixed_env_takes_precedence() {
        temp_env::with_vars(
            [
                ("NEW_RELIC_API_KEY", Some("standard-key")),
                ("NREVENT_EXPORTER__API_KEY", Some("prefixed-key")),
                ("NREVENT_EXPORTER__EVENT_TYPE", Some("EnvMetric")),
            ],
            || {
                let config = Config::load_from_path("/nonexistent/path/config.toml").unwrap();

                assert_eq!(config.exporter.api_key, "prefixed-key");
                assert_eq!(config.exporter.event_type, "EnvMetric");
            },
        );
    }
}
