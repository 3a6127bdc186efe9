//! Configuration of the API server and the SIMS worker.
//!
//! Both processes read one TOML file (`tapglue.toml` by default):
//!
//! - [`ServerConfig`] - HTTP listener and debug headers
//! - [`DatabaseConfig`] - SQLite file shared by every service
//! - [`QueueConfig`] - change queue backend and timeouts
//! - [`CacheConfig`] - count cache
//! - [`RateLimitConfig`] - per-app request quotas
//! - [`SimsConfig`] - notification worker
//! - [`LoggingConfig`] / [`MetricsConfig`] - observability
//!
//! Every section and field is optional; defaults suit a single-node setup.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants;
use crate::service::App;

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Non-fatal warnings that should be logged but don't prevent operation.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if there are any warnings.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Root of `tapglue.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub queue: QueueConfig,
    pub cache: CacheConfig,
    pub rate_limit: RateLimitConfig,
    pub sims: SimsConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    /// Value of the `X-Tapglue-Revision` header.
    pub revision: String,
    /// Value of the `X-Tapglue-Host` header.
    pub hostname: String,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: constants::DEFAULT_LISTEN
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 8083))),
            revision: env!("CARGO_PKG_VERSION").to_string(),
            hostname: default_hostname(),
            request_timeout_secs: 30,
        }
    }
}

fn default_hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .or_else(|| {
            fs::read_to_string("/etc/hostname")
                .ok()
                .map(|h| h.trim().to_string())
        })
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file; `:memory:` keeps everything in process memory.
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/tapglue.db"),
        }
    }
}

impl DatabaseConfig {
    pub fn is_memory(&self) -> bool {
        self.path.as_os_str() == ":memory:"
    }
}

/// Storage of the change queues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackendKind {
    /// Table in the SQLite database, shared across processes.
    #[default]
    Sqlite,
    /// Process memory; API and worker must run in one process.
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub backend: QueueBackendKind,
    pub wait_time_secs: u64,
    pub visibility_timeout_secs: u64,
    pub max_queue_size: Option<usize>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackendKind::default(),
            wait_time_secs: constants::QUEUE_WAIT_SECS,
            visibility_timeout_secs: constants::QUEUE_VISIBILITY_TIMEOUT_SECS,
            max_queue_size: None,
        }
    }
}

impl QueueConfig {
    /// Settings of the queue service.
    pub fn service_config(&self) -> crate::platform::queue::QueueConfig {
        crate::platform::queue::QueueConfig {
            wait_time: Duration::from_secs(self.wait_time_secs),
            visibility_timeout: Duration::from_secs(self.visibility_timeout_secs),
            max_queue_size: self.max_queue_size,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub count_ttl_secs: u64,
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            count_ttl_secs: constants::COUNT_CACHE_TTL_SECS,
            max_capacity: 100_000,
        }
    }
}

/// Requests per minute and app.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub production: i64,
    pub staging: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            production: constants::RATE_LIMIT_PRODUCTION,
            staging: constants::RATE_LIMIT_STAGING,
        }
    }
}

impl RateLimitConfig {
    /// Quota of `app` per window.
    pub fn limit_for(&self, app: &App) -> i64 {
        if app.in_production { self.production } else { self.staging }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimsConfig {
    pub dispatchers: usize,
    /// Capacity of the batch channel between consumers and dispatchers.
    pub batch_buffer: usize,
    /// Webhook of the push provider; pushes are only logged when unset.
    pub push_url: Option<String>,
}

impl Default for SimsConfig {
    fn default() -> Self {
        Self {
            dispatchers: num_cpus::get(),
            batch_buffer: 64,
            push_url: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            filter: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Address of the standalone Prometheus exporter.
    pub listen: Option<SocketAddr>,
}

impl Config {
    /// Load configuration from `path`, the `TAPGLUE_CONFIG` variable or
    /// `tapglue.toml`, falling back to defaults when no file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly named file is missing or any file
    /// cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from(path);
        }
        if let Ok(env_path) = std::env::var(constants::CONFIG_ENV_VAR) {
            return Self::load_from(env_path);
        }
        let default_path = Path::new(constants::DEFAULT_CONFIG_FILE);
        if default_path.exists() {
            return Self::load_from(default_path);
        }
        Ok(Self::default())
    }

    /// Load configuration from the specified path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read (IO error)
    /// - The file contains invalid TOML syntax
    /// - Fields are unknown or have invalid types
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Validate configuration.
    ///
    /// Returns a `ValidationResult` containing any non-fatal warnings.
    ///
    /// # Errors
    ///
    /// Returns an error listing every fatal problem:
    /// - Zero dispatchers or batch buffer
    /// - Zero queue visibility timeout
    /// - Non-positive rate limits
    /// - Malformed push webhook URL
    pub fn validate(&self) -> Result<ValidationResult> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if self.server.listen.port() != 0 && self.server.listen.port() < 1024 {
            warnings.push(format!(
                "Server port {} is a system/privileged port (< 1024)",
                self.server.listen.port()
            ));
        }
        if self.server.request_timeout_secs == 0 {
            errors.push("server.request_timeout_secs cannot be 0".to_string());
        }

        if self.queue.visibility_timeout_secs == 0 {
            errors.push("queue.visibility_timeout_secs cannot be 0".to_string());
        } else if self.queue.visibility_timeout_secs <= self.queue.wait_time_secs {
            warnings.push(format!(
                "queue.visibility_timeout_secs ({}) does not exceed queue.wait_time_secs ({})\n  \
                 Messages may be re-delivered while still being processed",
                self.queue.visibility_timeout_secs, self.queue.wait_time_secs
            ));
        }
        if self.queue.backend == QueueBackendKind::Sqlite && self.database.is_memory() {
            warnings.push(
                "queue.backend = \"sqlite\" with an in-memory database cannot be shared between processes"
                    .to_string(),
            );
        }

        if self.cache.count_ttl_secs == 0 {
            warnings.push("cache.count_ttl_secs = 0 disables count caching".to_string());
        }

        if self.rate_limit.production <= 0 || self.rate_limit.staging <= 0 {
            errors.push("rate_limit quotas must be positive".to_string());
        }

        if self.sims.dispatchers == 0 {
            errors.push("sims.dispatchers cannot be 0".to_string());
        }
        if self.sims.batch_buffer == 0 {
            errors.push("sims.batch_buffer cannot be 0".to_string());
        }
        if let Some(push_url) = &self.sims.push_url
            && url::Url::parse(push_url).is_err()
        {
            errors.push(format!("sims.push_url is not a valid URL: {push_url}"));
        }

        if !errors.is_empty() {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }

        Ok(ValidationResult { warnings })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.listen.port(), 8083);
        assert_eq!(config.queue.backend, QueueBackendKind::Sqlite);
        assert_eq!(config.queue.wait_time_secs, 10);
        assert_eq!(config.queue.visibility_timeout_secs, 60);
        assert_eq!(config.rate_limit.production, 20_000);
        assert_eq!(config.rate_limit.staging, 100);
        assert!(config.sims.dispatchers > 0);
    }

    #[test]
    fn test_parse_partial_config() -> anyhow::Result<()> {
        let config: Config = toml::from_str(
            r#"
[server]
listen = "0.0.0.0:9000"

[queue]
backend = "memory"

[rate_limit]
staging = 2

[logging]
format = "json"
"#,
        )?;

        assert_eq!(config.server.listen.port(), 9000);
        assert_eq!(config.queue.backend, QueueBackendKind::Memory);
        assert_eq!(config.rate_limit.staging, 2);
        assert_eq!(config.rate_limit.production, 20_000);
        assert_eq!(config.logging.format, LogFormat::Json);
        Ok(())
    }

    #[test]
    fn test_unknown_section_rejected() {
        assert!(toml::from_str::<Config>("[nope]\nx = 1").is_err());
    }

    #[test]
    fn test_load_from_file() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("tapglue.toml");
        fs::write(&path, "[database]\npath = \":memory:\"\n")?;

        let config = Config::load(Some(&path))?;
        assert!(config.database.is_memory());
        Ok(())
    }

    #[test]
    #[serial_test::serial]
    fn test_load_from_env_var() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("custom.toml");
        fs::write(&path, "[rate_limit]\nstaging = 7\n")?;

        // SAFETY: serialized with every other test touching the variable
        unsafe { std::env::set_var(constants::CONFIG_ENV_VAR, &path) };
        let loaded = Config::load(None);
        unsafe { std::env::remove_var(constants::CONFIG_ENV_VAR) };

        assert_eq!(loaded?.rate_limit.staging, 7);
        Ok(())
    }

    #[test]
    fn test_load_missing_explicit_file() {
        assert!(Config::load(Some(Path::new("/nonexistent/tapglue.toml"))).is_err());
    }

    #[test]
    fn test_validate_zero_dispatchers() {
        let mut config = Config::default();
        config.sims.dispatchers = 0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("sims.dispatchers"));
    }

    #[test]
    fn test_validate_warns_on_short_visibility() -> anyhow::Result<()> {
        let mut config = Config::default();
        config.queue.visibility_timeout_secs = 5;
        let result = config.validate()?;
        assert!(result.has_warnings());
        Ok(())
    }

    #[test]
    fn test_validate_bad_push_url() {
        let mut config = Config::default();
        config.sims.push_url = Some("not a url".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_limit_for_app() {
        let limits = RateLimitConfig {
            production: 10,
            staging: 2,
        };
        let mut app = App::default();
        assert_eq!(limits.limit_for(&app), 2);
        app.in_production = true;
        assert_eq!(limits.limit_for(&app), 10);
    }
}
