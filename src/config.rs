//! Configuration loading with layered overrides.
//!
//! Config is loaded in order (each layer overrides the previous):
//! 1. Default values
//! 2. Config file (TOML)
//! 3. Environment variables
//! 4. CLI arguments

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Authorization core configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: Database,
    #[serde(default)]
    pub cache: Cache,
    #[serde(default)]
    pub session: Session,
}

/// Durable store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Database {
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Upper bound for a single durable-store call.
    #[serde(default = "default_database_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for Database {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            timeout_ms: default_database_timeout_ms(),
        }
    }
}

impl Database {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_database_url() -> String {
    "data.db".to_string()
}

fn default_database_timeout_ms() -> u64 {
    2_000
}

/// Fast cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cache {
    /// Maximum number of cached entries.
    #[serde(default = "default_cache_capacity")]
    pub capacity: u64,
    /// Upper bound for a single cache call before falling back to the
    /// durable store.
    #[serde(default = "default_cache_timeout_ms")]
    pub timeout_ms: u64,
    /// Tokens living at most this long are cached; it also caps every
    /// cache TTL.
    #[serde(default = "default_session_window_secs")]
    pub session_window_secs: u64,
}

impl Default for Cache {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            timeout_ms: default_cache_timeout_ms(),
            session_window_secs: default_session_window_secs(),
        }
    }
}

fn default_cache_capacity() -> u64 {
    100_000
}

fn default_cache_timeout_ms() -> u64 {
    50
}

fn default_session_window_secs() -> u64 {
    7 * 24 * 3600
}

/// Session token settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// TTL for tokens issued without an explicit lifetime.
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            default_ttl_secs: default_ttl_secs(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    30 * 24 * 3600
}

/// Builder for loading configuration with customizable options.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Environment variable prefix (e.g., "MYAPP" -> MYAPP_CACHE_CAPACITY)
    pub env_prefix: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self {
            env_prefix: "TURNSTILE".to_string(),
        }
    }
}

impl ConfigLoader {
    /// Create a new config loader with the given environment prefix.
    pub fn new(env_prefix: impl Into<String>) -> Self {
        Self {
            env_prefix: env_prefix.into(),
        }
    }

    /// Load configuration from file, environment, and CLI arguments.
    ///
    /// # Arguments
    /// * `config_path` - Optional path to TOML config file
    /// * `cli_database_url` - CLI override for database URL
    /// * `cli_cache_capacity` - CLI override for cache capacity
    /// * `cli_default_ttl_secs` - CLI override for the default token TTL
    pub fn load(
        &self,
        config_path: Option<&Path>,
        cli_database_url: Option<&str>,
        cli_cache_capacity: Option<u64>,
        cli_default_ttl_secs: Option<u64>,
    ) -> crate::Result<Config> {
        let mut config: Config = if let Some(path) = config_path {
            let content = std::fs::read_to_string(path)
                .map_err(|e| Error::Config(format!("Failed to read config file: {e}")))?;
            toml::from_str(&content)
                .map_err(|e| Error::Config(format!("Failed to parse config: {e}")))?
        } else {
            Config::default()
        };

        let prefix = &self.env_prefix;
        let env_u64 = |name: &str| -> crate::Result<Option<u64>> {
            match std::env::var(format!("{prefix}_{name}")) {
                Ok(raw) => raw.parse().map(Some).map_err(|_| {
                    Error::Config(format!("{prefix}_{name} must be an unsigned integer"))
                }),
                Err(_) => Ok(None),
            }
        };

        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database.url = url;
        }
        if let Some(ms) = env_u64("DATABASE_TIMEOUT_MS")? {
            config.database.timeout_ms = ms;
        }
        if let Some(capacity) = env_u64("CACHE_CAPACITY")? {
            config.cache.capacity = capacity;
        }
        if let Some(ms) = env_u64("CACHE_TIMEOUT_MS")? {
            config.cache.timeout_ms = ms;
        }
        if let Some(secs) = env_u64("SESSION_WINDOW_SECS")? {
            config.cache.session_window_secs = secs;
        }
        if let Some(secs) = env_u64("TOKEN_TTL_SECS")? {
            config.session.default_ttl_secs = secs;
        }

        if let Some(url) = cli_database_url {
            config.database.url = url.to_string();
        }
        if let Some(capacity) = cli_cache_capacity {
            config.cache.capacity = capacity;
        }
        if let Some(secs) = cli_default_ttl_secs {
            config.session.default_ttl_secs = secs;
        }

        validate(&config)?;
        Ok(config)
    }
}

fn validate(config: &Config) -> crate::Result<()> {
    let checks = [
        (config.database.timeout_ms, "database.timeout_ms"),
        (config.cache.capacity, "cache.capacity"),
        (config.cache.timeout_ms, "cache.timeout_ms"),
        (config.cache.session_window_secs, "cache.session_window_secs"),
        (config.session.default_ttl_secs, "session.default_ttl_secs"),
    ];
    if let Some((_, field)) = checks.iter().find(|(value, _)| *value == 0) {
        return Err(Error::Config(format!("{field} must be greater than zero")));
    }
    Ok(())
}
