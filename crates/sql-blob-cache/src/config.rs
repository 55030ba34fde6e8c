//! Cache configuration parsed from environment variables

use std::env;

/// Connection and cache settings
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub database_url: String,
    pub table: String,
    pub max_connections: u32,
    /// Default TTL in seconds applied by the facade when a call gives none.
    pub default_ttl: u64,
}

impl CacheConfig {
    pub fn new(database_url: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            table: table.into(),
            max_connections: 10,
            default_ttl: 86_400,
        }
    }

    /// Parse configuration from environment variables
    pub fn from_env() -> Self {
        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/cache".to_string());

        let table = env::var("CACHE_TABLE").unwrap_or_else(|_| "cache".to_string());

        let max_connections = env::var("CACHE_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        let default_ttl = env::var("CACHE_DEFAULT_TTL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(86_400);

        Self {
            database_url,
            table,
            max_connections,
            default_ttl,
        }
    }

    pub fn max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn default_ttl(mut self, default_ttl: u64) -> Self {
        self.default_ttl = default_ttl;
        self
    }
}
