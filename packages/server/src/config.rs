//! Server configuration.
//!
//! Values come from, in increasing precedence: built-in defaults, an
//! optional TOML file named by `GEODATA_CONFIG`, and individual
//! environment variables (`GEODATA_DB_PATH`, `BIND_ADDR`, `PORT`, ...).

use std::{path::PathBuf, str::FromStr, time::Duration};

use serde::Deserialize;

/// Environment variable naming the TOML config file.
pub const CONFIG_ENV: &str = "GEODATA_CONFIG";

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Io {
        /// Path that was read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`ServerConfig`].
    #[error("Invalid config file: {0}")]
    Toml(#[from] toml::de::Error),

    /// An environment override could not be parsed.
    #[error("Invalid value {value:?} for {name}")]
    InvalidEnv {
        /// Variable name.
        name: String,
        /// Value as found.
        value: String,
    },
}

/// Runtime settings for the HTTP server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Path to the geodata `DuckDB` file.
    pub db_path: PathBuf,
    /// Address to bind.
    pub bind_addr: String,
    /// Port to bind.
    pub port: u16,
    /// Number of pooled read-only connections.
    pub pool_size: usize,
    /// Per-request triple ceiling for pivot queries; `0` is unlimited.
    pub max_metrics: usize,
    /// Data version string pinned on every query.
    pub ver_string: String,
    /// Response cache TTL; `0` disables the cache.
    pub cache_ttl_secs: u64,
    /// Maximum cached responses.
    pub cache_max_entries: usize,
    /// Per-request deadline; `0` disables it.
    pub request_timeout_secs: u64,
    /// Load the `DuckDB` `spatial` extension to enable polygon filters.
    pub enable_spatial: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            db_path: geodata_database::paths::default_db_path(),
            bind_addr: "127.0.0.1".to_string(),
            port: 8080,
            pool_size: 4,
            max_metrics: 0,
            ver_string: geodata_models::DEFAULT_VER_STRING.to_string(),
            cache_ttl_secs: 300,
            cache_max_entries: 1024,
            request_timeout_secs: 30,
            enable_spatial: false,
        }
    }
}

fn parse_env<T: FromStr>(name: &str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv {
            name: name.to_string(),
            value,
        })
}

impl ServerConfig {
    /// Loads configuration from `GEODATA_CONFIG` (if set) and the process
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, or an
    /// override is malformed.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) if !path.trim().is_empty() => {
                let path = PathBuf::from(path);
                let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                    path: path.clone(),
                    source,
                })?;
                log::info!("Loading config from {}", path.display());
                Self::from_toml(&text)?
            }
            _ => Self::default(),
        };

        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Parses a TOML document; absent keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Toml`] on malformed input or unknown keys.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Applies environment overrides looked up through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] if a value fails to parse.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("GEODATA_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("BIND_ADDR") {
            self.bind_addr = v;
        }
        if let Some(v) = lookup("PORT") {
            self.port = parse_env("PORT", v)?;
        }
        if let Some(v) = lookup("POOL_SIZE") {
            self.pool_size = parse_env("POOL_SIZE", v)?;
        }
        if let Some(v) = lookup("MAX_METRICS") {
            self.max_metrics = parse_env("MAX_METRICS", v)?;
        }
        if let Some(v) = lookup("VER_STRING") {
            self.ver_string = v;
        }
        if let Some(v) = lookup("CACHE_TTL_SECS") {
            self.cache_ttl_secs = parse_env("CACHE_TTL_SECS", v)?;
        }
        if let Some(v) = lookup("CACHE_MAX_ENTRIES") {
            self.cache_max_entries = parse_env("CACHE_MAX_ENTRIES", v)?;
        }
        if let Some(v) = lookup("REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_env("REQUEST_TIMEOUT_SECS", v)?;
        }
        if let Some(v) = lookup("ENABLE_SPATIAL") {
            self.enable_spatial = parse_env("ENABLE_SPATIAL", v)?;
        }
        Ok(())
    }

    /// The cache TTL.
    #[must_use]
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// The request deadline, if enabled.
    #[must_use]
    pub const fn request_timeout(&self) -> Option<Duration> {
        if self.request_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.request_timeout_secs))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn toml_overrides_defaults() {
        let config = ServerConfig::from_toml(
            r#"
            db_path = "/srv/geodata.duckdb"
            port = 9000
            max_metrics = 400000
            "#,
        )
        .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/srv/geodata.duckdb"));
        assert_eq!(config.port, 9000);
        assert_eq!(config.max_metrics, 400_000);
        assert_eq!(config.ver_string, "2.2");
        assert_eq!(config.bind_addr, "127.0.0.1");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(ServerConfig::from_toml("prot = 9000").is_err());
    }

    #[test]
    fn env_overrides_file() {
        let env: BTreeMap<&str, &str> = [("PORT", "7000"), ("ENABLE_SPATIAL", "true"), ("REQUEST_TIMEOUT_SECS", "0")]
            .into_iter()
            .collect();
        let mut config = ServerConfig::from_toml("port = 9000").unwrap();
        config
            .apply_env(|name| env.get(name).map(|v| (*v).to_string()))
            .unwrap();

        assert_eq!(config.port, 7000);
        assert!(config.enable_spatial);
        assert_eq!(config.request_timeout(), None);
    }

    #[test]
    fn malformed_env_names_the_variable() {
        let mut config = ServerConfig::default();
        let err = config
            .apply_env(|name| (name == "PORT").then(|| "eighty".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { ref name, .. } if name == "PORT"));
    }
}
