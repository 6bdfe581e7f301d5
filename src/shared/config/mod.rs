//! Sync configuration module
//!
//! Provides the configuration consumed by the local database, the remote adapter and
//! the sync engine. Values come from a builder, a TOML file, or both, with
//! `ROOFSYNC_*` environment variables applied last.
//!
//! ```toml
//! database_path = "/var/lib/roofsync/local.db"
//! max_sync_attempts = 5
//! sync_interval_secs = 300
//!
//! [remote]
//! base_url = "https://project.supabase.co"
//! api_key = "anon-key"
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default number of remote attempts before a queue item is abandoned
pub const DEFAULT_MAX_SYNC_ATTEMPTS: u32 = 5;

/// Default period of the background drain timer
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Sync configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Local database file; `None` uses the platform data directory
    pub database_path: Option<PathBuf>,
    /// Attempts allowed per queue item before it is dropped and its record marked `error`
    pub max_sync_attempts: u32,
    /// Period of the background drain while online
    pub sync_interval: Duration,
    /// Remote backend settings
    pub remote: RemoteConfig,
}

/// Remote backend settings
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Base URL of the REST endpoint
    pub base_url: Option<String>,
    /// API key sent as `apikey` and bearer token
    pub api_key: Option<String>,
    /// Per-request timeout; unset means requests may hang indefinitely
    pub timeout_secs: Option<u64>,
    /// Health endpoint polled by the agent as its connectivity signal
    pub health_url: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            max_sync_attempts: DEFAULT_MAX_SYNC_ATTEMPTS,
            sync_interval: DEFAULT_SYNC_INTERVAL,
            remote: RemoteConfig::default(),
        }
    }
}

/// On-disk shape of the configuration file
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    database_path: Option<PathBuf>,
    max_sync_attempts: Option<u32>,
    sync_interval_secs: Option<u64>,
    #[serde(default)]
    remote: RemoteConfig,
}

impl SyncConfig {
    /// Create a new SyncConfigBuilder
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::default()
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {}", path.display(), e)))?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text without consulting the environment
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let mut builder = Self::builder().remote(file.remote);
        if let Some(path) = file.database_path {
            builder = builder.database_path(path);
        }
        if let Some(attempts) = file.max_sync_attempts {
            builder = builder.max_sync_attempts(attempts);
        }
        if let Some(secs) = file.sync_interval_secs {
            builder = builder.sync_interval(Duration::from_secs(secs));
        }
        builder.build()
    }

    /// Configuration from defaults plus environment overrides
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `ROOFSYNC_*` overrides read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("ROOFSYNC_DATABASE_PATH") {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(url) = lookup("ROOFSYNC_REMOTE_URL") {
            self.remote.base_url = Some(url);
        }
        if let Some(key) = lookup("ROOFSYNC_API_KEY") {
            self.remote.api_key = Some(key);
        }
        if let Some(raw) = lookup("ROOFSYNC_MAX_SYNC_ATTEMPTS") {
            self.max_sync_attempts = raw
                .parse()
                .map_err(|_| ConfigError::InvalidValue("ROOFSYNC_MAX_SYNC_ATTEMPTS", raw))?;
        }
        if let Some(raw) = lookup("ROOFSYNC_SYNC_INTERVAL_SECS") {
            let secs: u64 = raw
                .parse()
                .map_err(|_| ConfigError::InvalidValue("ROOFSYNC_SYNC_INTERVAL_SECS", raw))?;
            self.sync_interval = Duration::from_secs(secs);
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_sync_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "max_sync_attempts",
                self.max_sync_attempts.to_string(),
            ));
        }
        if self.sync_interval.is_zero() {
            return Err(ConfigError::InvalidValue("sync_interval", "0".to_string()));
        }
        for url in [&self.remote.base_url, &self.remote.health_url].into_iter().flatten() {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidUrl(url.clone()));
            }
        }
        Ok(())
    }

    /// Remote base URL, required by the REST adapter
    pub fn remote_url(&self) -> Result<&str, ConfigError> {
        self.remote
            .base_url
            .as_deref()
            .ok_or(ConfigError::MissingValue("remote.base_url"))
    }

    /// Resolved database path
    ///
    /// Falls back to `<data dir>/roofsync/local.db`.
    pub fn resolved_database_path(&self) -> PathBuf {
        if let Some(path) = &self.database_path {
            return path.clone();
        }
        let mut path = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
        path.push("roofsync");
        path.push("local.db");
        path
    }
}

/// Builder for SyncConfig
#[derive(Debug, Default)]
pub struct SyncConfigBuilder {
    database_path: Option<PathBuf>,
    max_sync_attempts: Option<u32>,
    sync_interval: Option<Duration>,
    remote: RemoteConfig,
}

impl SyncConfigBuilder {
    /// Set the database path
    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Set the attempt cap
    pub fn max_sync_attempts(mut self, attempts: u32) -> Self {
        self.max_sync_attempts = Some(attempts);
        self
    }

    /// Set the background drain period
    pub fn sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = Some(interval);
        self
    }

    /// Set the remote base URL
    pub fn remote_url(mut self, url: impl Into<String>) -> Self {
        self.remote.base_url = Some(url.into());
        self
    }

    /// Set the remote API key
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.remote.api_key = Some(key.into());
        self
    }

    /// Replace all remote settings
    pub fn remote(mut self, remote: RemoteConfig) -> Self {
        self.remote = remote;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<SyncConfig, ConfigError> {
        let config = SyncConfig {
            database_path: self.database_path,
            max_sync_attempts: self.max_sync_attempts.unwrap_or(DEFAULT_MAX_SYNC_ATTEMPTS),
            sync_interval: self.sync_interval.unwrap_or(DEFAULT_SYNC_INTERVAL),
            remote: self.remote,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("missing value: {0}")]
    MissingValue(&'static str),
    #[error("invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
    #[error("failed to read config: {0}")]
    Read(String),
    #[error("failed to parse config: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::builder().build().unwrap();
        assert_eq!(config.max_sync_attempts, 5);
        assert_eq!(config.sync_interval, Duration::from_secs(300));
        assert!(config.remote_url().is_err());
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let result = SyncConfig::builder().max_sync_attempts(0).build();
        assert!(matches!(result, Err(ConfigError::InvalidValue("max_sync_attempts", _))));
    }

    #[test]
    fn test_bad_url_rejected() {
        let result = SyncConfig::builder().remote_url("ftp://example.com").build();
        assert!(matches!(result, Err(ConfigError::InvalidUrl(_))));
    }

    #[test]
    fn test_from_toml() {
        let config = SyncConfig::from_toml_str(
            r#"
            database_path = "/tmp/roofsync.db"
            max_sync_attempts = 3
            sync_interval_secs = 60

            [remote]
            base_url = "https://example.supabase.co"
            api_key = "secret"
            "#,
        )
        .unwrap();

        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/roofsync.db")));
        assert_eq!(config.max_sync_attempts, 3);
        assert_eq!(config.sync_interval, Duration::from_secs(60));
        assert_eq!(config.remote_url().unwrap(), "https://example.supabase.co");
        assert_eq!(config.remote.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let result = SyncConfig::from_toml_str("max_attempts = 3");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("ROOFSYNC_MAX_SYNC_ATTEMPTS", "7"),
            ("ROOFSYNC_REMOTE_URL", "http://localhost:54321"),
            ("ROOFSYNC_SYNC_INTERVAL_SECS", "15"),
        ]
        .into_iter()
        .collect();

        let mut config = SyncConfig::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.max_sync_attempts, 7);
        assert_eq!(config.sync_interval, Duration::from_secs(15));
        assert_eq!(config.remote_url().unwrap(), "http://localhost:54321");
    }

    #[test]
    fn test_env_override_not_a_number() {
        let mut config = SyncConfig::default();
        let result = config.apply_env(|key| {
            (key == "ROOFSYNC_MAX_SYNC_ATTEMPTS").then(|| "many".to_string())
        });
        assert!(matches!(result, Err(ConfigError::InvalidValue(_, _))));
    }
}
