//! Configuration management for steadfast routers.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::{
    client::ClientConfig,
    policy::{RetrySettings, DEFAULT_MAX_RETRIES},
    router::{DEFAULT_SHUTDOWN_TIMEOUT, DEFAULT_WORKER_COUNT},
};

const CONFIG_FILE: &str = "steadfast.toml";
const ENV_PREFIX: &str = "STEADFAST_";

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Complete router configuration with defaults, file, and environment
/// overrides.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables prefixed `STEADFAST_` (highest priority)
/// 2. Configuration file (`steadfast.toml`)
/// 3. Built-in defaults (lowest priority)
///
/// Setting `object_store_path` makes the router asynchronous and durable.
///
/// # Example
///
/// ```no_run
/// use steadfast_router::Config;
///
/// let config = Config::load().expect("Failed to load configuration");
/// println!("router {} retries {} times", config.name, config.max_retries);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Router name, used in logs and as the leading part of new queue keys.
    ///
    /// Environment variable: `STEADFAST_NAME`
    #[serde(default = "default_name")]
    pub name: String,

    // Retry
    /// Retries after the initial attempt.
    ///
    /// Environment variable: `STEADFAST_MAX_RETRIES`
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Wait between attempts in milliseconds.
    ///
    /// Environment variable: `STEADFAST_MILLIS_BETWEEN_RETRIES`
    #[serde(default)]
    pub millis_between_retries: Option<u64>,
    /// Wait between attempts in seconds. Exclusive with the millisecond form.
    ///
    /// Environment variable: `STEADFAST_SECONDS_BETWEEN_RETRIES`
    #[serde(default)]
    pub seconds_between_retries: Option<u64>,
    /// Expression producing the acknowledgement.
    ///
    /// Environment variable: `STEADFAST_ACK_EXPRESSION`
    #[serde(default)]
    pub ack_expression: Option<String>,
    /// Expression marking returned events as failed.
    ///
    /// Environment variable: `STEADFAST_FAILURE_EXPRESSION`
    #[serde(default)]
    pub failure_expression: Option<String>,

    // Workers
    /// Workers of an asynchronous router.
    ///
    /// Environment variable: `STEADFAST_WORKER_COUNT`
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Time `stop` waits for workers, in seconds.
    ///
    /// Environment variable: `STEADFAST_SHUTDOWN_TIMEOUT_SECONDS`
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,

    // Endpoints
    /// SQLite database holding pending events.
    ///
    /// Environment variable: `STEADFAST_OBJECT_STORE_PATH`
    #[serde(default)]
    pub object_store_path: Option<PathBuf>,
    /// URL of the downstream route.
    ///
    /// Environment variable: `STEADFAST_ROUTE_URL`
    #[serde(default)]
    pub route_url: Option<String>,
    /// URL receiving dead-lettered events.
    ///
    /// Environment variable: `STEADFAST_DEAD_LETTER_URL`
    #[serde(default)]
    pub dead_letter_url: Option<String>,
    /// HTTP request timeout in seconds.
    ///
    /// Environment variable: `STEADFAST_REQUEST_TIMEOUT_SECONDS`
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    // Logging
    /// Log filter used when `RUST_LOG` is unset.
    ///
    /// Environment variable: `STEADFAST_RUST_LOG`
    #[serde(default = "default_log_level")]
    pub rust_log: String,
    /// Log output format.
    ///
    /// Environment variable: `STEADFAST_LOG_FORMAT`
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Config {
    /// Loads configuration from defaults, `steadfast.toml` in the working
    /// directory, and environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(CONFIG_FILE)
    }

    /// Loads configuration from defaults, the TOML file at `path` if it
    /// exists, and environment overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX));

        let config: Self = figment.extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Retry settings for the router builder.
    pub fn retry_settings(&self) -> RetrySettings {
        RetrySettings {
            max_retries: self.max_retries,
            millis_between_retries: self.millis_between_retries,
            seconds_between_retries: self.seconds_between_retries,
            ack_expression: self.ack_expression.clone(),
            failure_expression: self.failure_expression.clone(),
        }
    }

    /// HTTP client configuration for route and dead-letter adapters.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: Duration::from_secs(self.request_timeout_seconds),
            ..ClientConfig::default()
        }
    }

    /// Time `stop` waits for workers.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }

    /// Returns true if events are persisted and retried in the background.
    pub fn is_asynchronous(&self) -> bool {
        self.object_store_path.is_some()
    }

    /// Validates configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("name must not be empty");
        }

        if self.millis_between_retries.is_some() && self.seconds_between_retries.is_some() {
            anyhow::bail!("millis_between_retries and seconds_between_retries cannot both be set");
        }

        if self.worker_count == 0 {
            anyhow::bail!("worker_count must be greater than 0");
        }

        if self.request_timeout_seconds == 0 {
            anyhow::bail!("request_timeout_seconds must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: default_name(),
            max_retries: default_max_retries(),
            millis_between_retries: None,
            seconds_between_retries: None,
            ack_expression: None,
            failure_expression: None,
            worker_count: default_worker_count(),
            shutdown_timeout_seconds: default_shutdown_timeout(),
            object_store_path: None,
            route_url: None,
            dead_letter_url: None,
            request_timeout_seconds: default_request_timeout(),
            rust_log: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

fn default_name() -> String {
    "steadfast".to_string()
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_worker_count() -> usize {
    DEFAULT_WORKER_COUNT
}

fn default_shutdown_timeout() -> u64 {
    DEFAULT_SHUTDOWN_TIMEOUT.as_secs()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, env, fs, sync::Mutex};

    use super::*;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    struct TestEnvGuard {
        _lock: std::sync::MutexGuard<'static, ()>,
        originals: HashMap<String, Option<String>>,
    }

    impl TestEnvGuard {
        fn new() -> Self {
            let lock = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            Self { _lock: lock, originals: HashMap::new() }
        }

        fn set_var(&mut self, key: &str, value: &str) {
            self.originals.entry(key.to_string()).or_insert_with(|| env::var(key).ok());
            env::set_var(key, value);
        }
    }

    impl Drop for TestEnvGuard {
        fn drop(&mut self) {
            for (key, original) in &self.originals {
                match original {
                    Some(value) => env::set_var(key, value),
                    None => env::remove_var(key),
                }
            }
        }
    }

    #[test]
    fn default_config_snapshot() {
        let config = Config::default();

        assert!(config.validate().is_ok());
        insta::assert_json_snapshot!(config, @r###"
        {
          "name": "steadfast",
          "max_retries": 5,
          "millis_between_retries": null,
          "seconds_between_retries": null,
          "ack_expression": null,
          "failure_expression": null,
          "worker_count": 4,
          "shutdown_timeout_seconds": 30,
          "object_store_path": null,
          "route_url": null,
          "dead_letter_url": null,
          "request_timeout_seconds": 30,
          "rust_log": "info",
          "log_format": "pretty"
        }
        "###);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let _guard = TestEnvGuard::new();
        let dir = tempfile::tempdir().unwrap();

        let config = Config::load_from(dir.path().join("absent.toml")).unwrap();

        assert_eq!(config, Config::default());
        assert!(!config.is_asynchronous());
    }

    #[test]
    fn file_values_override_defaults() {
        let _guard = TestEnvGuard::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("steadfast.toml");
        fs::write(
            &path,
            r##"
            name = "billing"
            max_retries = 2
            seconds_between_retries = 1
            failure_expression = "#[regex('(?i)error')]"
            object_store_path = "/var/lib/steadfast/queue.db"
            log_format = "json"
            "##,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();

        assert_eq!(config.name, "billing");
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.seconds_between_retries, Some(1));
        assert_eq!(config.log_format, LogFormat::Json);
        assert!(config.is_asynchronous());
        assert_eq!(
            config.retry_settings().failure_expression.as_deref(),
            Some("#[regex('(?i)error')]")
        );
    }

    #[test]
    fn environment_overrides_file() {
        let mut guard = TestEnvGuard::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("steadfast.toml");
        fs::write(&path, "max_retries = 2\nworker_count = 2\n").unwrap();
        guard.set_var("STEADFAST_MAX_RETRIES", "7");
        guard.set_var("STEADFAST_MILLIS_BETWEEN_RETRIES", "250");

        let config = Config::load_from(&path).unwrap();

        assert_eq!(config.max_retries, 7);
        assert_eq!(config.worker_count, 2);
        assert_eq!(config.millis_between_retries, Some(250));
    }

    #[test]
    fn both_wait_forms_fail_to_load() {
        let _guard = TestEnvGuard::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("steadfast.toml");
        fs::write(&path, "millis_between_retries = 1000\nseconds_between_retries = 1\n").unwrap();

        let error = Config::load_from(&path).unwrap_err();

        assert!(error.to_string().contains("cannot both be set"));
    }

    #[test]
    fn invalid_config_validation_fails() {
        let mut config = Config::default();
        config.worker_count = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.name = "  ".to_string();
        assert!(config.validate().is_err());

        config = Config::default();
        config.request_timeout_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn conversions_carry_configured_values() {
        let config = Config {
            max_retries: 3,
            millis_between_retries: Some(500),
            ack_expression: Some("#[string:ACK]".into()),
            request_timeout_seconds: 5,
            shutdown_timeout_seconds: 10,
            ..Config::default()
        };

        let settings = config.retry_settings();
        assert_eq!(settings.max_retries, 3);
        assert_eq!(settings.millis_between_retries, Some(500));
        assert_eq!(settings.ack_expression.as_deref(), Some("#[string:ACK]"));
        assert_eq!(config.to_client_config().timeout, Duration::from_secs(5));
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(10));
    }
}
