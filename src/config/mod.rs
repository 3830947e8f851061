//! Application configuration management

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use bcrypt::DEFAULT_COST;

/// Default user read-model lifetime: one week.
const DEFAULT_USER_CACHE_TTL_SECS: u64 = 60 * 60 * 24 * 7;

/// Application configuration loaded from environment variables
#[derive(Clone)]
pub struct Config {
    /// SQLite database URL
    pub database_url: String,

    /// Maximum pooled connections
    pub database_max_connections: u32,

    /// Password pepper and admin session signing key
    pub secret_key: String,

    /// Bcrypt cost factor
    pub bcrypt_cost: u32,

    /// Default cache entry lifetime
    pub cache_ttl: Duration,

    /// Lifetime of the cached user read-model
    pub user_cache_ttl: Duration,

    /// Development mode
    pub debug: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &self.database_url)
            .field("database_max_connections", &self.database_max_connections)
            .field("secret_key", &"<redacted>")
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("cache_ttl", &self.cache_ttl)
            .field("user_cache_ttl", &self.user_cache_ttl)
            .field("debug", &self.debug)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite:sobes.db".to_string(),
            database_max_connections: 10,
            secret_key: "123".to_string(),
            bcrypt_cost: DEFAULT_COST,
            cache_ttl: Duration::from_secs(60),
            user_cache_ttl: Duration::from_secs(DEFAULT_USER_CACHE_TTL_SECS),
            debug: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup. Empty values count
    /// as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Ok(Self {
            database_url: get("DATABASE_URL").unwrap_or(defaults.database_url),

            database_max_connections: get("DATABASE_MAX_CONNECTIONS")
                .map(|v| v.parse())
                .transpose()
                .context("Invalid DATABASE_MAX_CONNECTIONS")?
                .unwrap_or(defaults.database_max_connections),

            secret_key: get("SECRET_KEY").unwrap_or(defaults.secret_key),

            bcrypt_cost: get("BCRYPT_COST")
                .map(|v| v.parse())
                .transpose()
                .context("Invalid BCRYPT_COST")?
                .unwrap_or(defaults.bcrypt_cost),

            cache_ttl: get("CACHE_TTL_SECONDS")
                .map(|v| v.parse().map(Duration::from_secs))
                .transpose()
                .context("Invalid CACHE_TTL_SECONDS")?
                .unwrap_or(defaults.cache_ttl),

            user_cache_ttl: get("USER_CACHE_TTL_SECONDS")
                .map(|v| v.parse().map(Duration::from_secs))
                .transpose()
                .context("Invalid USER_CACHE_TTL_SECONDS")?
                .unwrap_or(defaults.user_cache_ttl),

            debug: get("DEBUG")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(defaults.debug),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_map(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = from_map(&[]).unwrap();
        assert_eq!(config.database_url, "sqlite:sobes.db");
        assert_eq!(config.database_max_connections, 10);
        assert_eq!(config.secret_key, "123");
        assert_eq!(config.cache_ttl, Duration::from_secs(60));
        assert_eq!(config.user_cache_ttl, Duration::from_secs(604_800));
        assert!(!config.debug);
    }

    #[test]
    fn test_overrides() {
        let config = from_map(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("BCRYPT_COST", "4"),
            ("CACHE_TTL_SECONDS", "5"),
            ("DEBUG", "true"),
            ("SECRET_KEY", ""),
        ])
        .unwrap();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.bcrypt_cost, 4);
        assert_eq!(config.cache_ttl, Duration::from_secs(5));
        assert!(config.debug);
        assert_eq!(config.secret_key, "123");
    }

    #[test]
    fn test_invalid_number_is_reported() {
        let err = from_map(&[("DATABASE_MAX_CONNECTIONS", "many")]).unwrap_err();
        assert!(err.to_string().contains("DATABASE_MAX_CONNECTIONS"));
    }

    #[test]
    fn test_secret_is_not_printed() {
        let config = from_map(&[("SECRET_KEY", "hunter2")]).unwrap();
        assert!(!format!("{:?}", config).contains("hunter2"));
    }
}
