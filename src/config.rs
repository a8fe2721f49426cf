//! Configuration management for the puzzle sync server

use serde::Deserialize;
use std::env;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub backend: StoreBackend,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub secret: String,
    pub token_ttl_secs: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Read-decide-write attempts per item before a conflict is surfaced
    pub max_attempts: u32,
    /// Clamp for created-after pages
    pub max_page_size: usize,
    pub leaderboard_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            database: DatabaseConfig {
                backend: StoreBackend::Sqlite,
                url: "sqlite:./puzzle-sync.db".to_string(),
            },
            auth: AuthConfig {
                // No usable signing key until one is configured
                secret: String::new(),
                token_ttl_secs: 86_400,
            },
            sync: SyncConfig {
                max_attempts: 3,
                max_page_size: 500,
                leaderboard_limit: 50,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build the configuration from a variable lookup
    ///
    /// Everything but `AUTH_SECRET` falls back to its default.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let parse_or = |key: &str, default: u64| -> u64 {
            var(key).and_then(|v| v.parse().ok()).unwrap_or(default)
        };
        let defaults = Config::default();

        Ok(Config {
            server: ServerConfig {
                host: var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: var("SERVER_PORT")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.server.port),
            },
            database: DatabaseConfig {
                backend: match var("STORE_BACKEND").as_deref() {
                    Some("memory") => StoreBackend::Memory,
                    _ => StoreBackend::Sqlite,
                },
                url: var("DATABASE_URL").unwrap_or(defaults.database.url),
            },
            auth: AuthConfig {
                secret: var("AUTH_SECRET")
                    .filter(|s| !s.trim().is_empty())
                    .ok_or(ConfigError::Missing("AUTH_SECRET"))?,
                token_ttl_secs: var("AUTH_TOKEN_TTL_SECS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.auth.token_ttl_secs),
            },
            sync: SyncConfig {
                max_attempts: parse_or("SYNC_MAX_ATTEMPTS", defaults.sync.max_attempts.into()) as u32,
                max_page_size: parse_or("SYNC_MAX_PAGE_SIZE", defaults.sync.max_page_size as u64)
                    as usize,
                leaderboard_limit: parse_or(
                    "LEADERBOARD_LIMIT",
                    defaults.sync.leaderboard_limit as u64,
                ) as usize,
            },
        })
    }
}
