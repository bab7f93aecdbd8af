//! API Configuration Module
//!
//! Server, cache and storage settings loaded from environment variables with
//! development defaults. Upstream client settings live with the clients
//! (`ParserConfig`, `MetadataConfig`, `CircuitBreakerConfig`); database
//! settings live in [`crate::db::DbConfig`].

use std::net::SocketAddr;
use std::str::FromStr;

use replaylens_core::{ConfigError, DEFAULT_SCHEMA_VERSION};

use crate::constants::{DEFAULT_BIND_HOST, DEFAULT_CACHE_MAX_AGE_SECS, DEFAULT_PORT};

// ============================================================================
// STORE BACKEND
// ============================================================================

/// Which artifact store backs the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(Self::Postgres),
            "memory" | "mem" => Ok(Self::Memory),
            other => Err(ConfigError::InvalidValue {
                field: "REPLAYLENS_STORE".to_string(),
                value: other.to_string(),
                reason: "expected 'postgres' or 'memory'".to_string(),
            }),
        }
    }
}

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_host: String,
    pub port: u16,

    /// Current artifact schema version. Rows at other versions are ignored.
    pub schema_version: i32,

    /// `max-age` sent with analysis responses.
    pub cache_max_age_secs: u64,

    /// Allowed CORS origins. Empty means allow all (dev mode).
    pub cors_origins: Vec<String>,

    pub store: StoreBackend,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_host: DEFAULT_BIND_HOST.to_string(),
            port: DEFAULT_PORT,
            schema_version: DEFAULT_SCHEMA_VERSION,
            cache_max_age_secs: DEFAULT_CACHE_MAX_AGE_SECS,
            cors_origins: Vec::new(),
            store: StoreBackend::Postgres,
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `REPLAYLENS_API_BIND`: bind host (default: 0.0.0.0)
    /// - `PORT` or `REPLAYLENS_API_PORT`: bind port (default: 8080)
    /// - `REPLAYLENS_SCHEMA_VERSION`: artifact schema version (default: 1)
    /// - `REPLAYLENS_CACHE_MAX_AGE_SECS`: Cache-Control max-age (default: 300)
    /// - `REPLAYLENS_CORS_ORIGINS`: comma-separated allowed origins (empty = allow all)
    /// - `REPLAYLENS_STORE`: `postgres` or `memory` (default: postgres)
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_host = std::env::var("REPLAYLENS_API_BIND")
            .unwrap_or_else(|_| DEFAULT_BIND_HOST.to_string());

        let port = std::env::var("PORT")
            .or_else(|_| std::env::var("REPLAYLENS_API_PORT"))
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let schema_version = std::env::var("REPLAYLENS_SCHEMA_VERSION")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|v: &i32| *v > 0)
            .unwrap_or(DEFAULT_SCHEMA_VERSION);

        let cache_max_age_secs = std::env::var("REPLAYLENS_CACHE_MAX_AGE_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_CACHE_MAX_AGE_SECS);

        let cors_origins = std::env::var("REPLAYLENS_CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let store = match std::env::var("REPLAYLENS_STORE") {
            Ok(raw) => raw.parse()?,
            Err(_) => StoreBackend::Postgres,
        };

        Ok(Self {
            bind_host,
            port,
            schema_version,
            cache_max_age_secs,
            cors_origins,
            store,
        })
    }

    /// Socket address to bind.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_host, self.port)
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::InvalidValue {
                field: "REPLAYLENS_API_BIND".to_string(),
                value: self.bind_host.clone(),
                reason: e.to_string(),
            })
    }

    /// `Cache-Control` header value for analysis responses.
    pub fn cache_control(&self) -> String {
        format!("public, max-age={}", self.cache_max_age_secs)
    }

    /// Check if a given origin is allowed.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        self.cors_origins.is_empty() || self.cors_origins.iter().any(|o| o == origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.schema_version, 1);
        assert_eq!(config.cache_control(), "public, max-age=300");
        assert_eq!(config.store, StoreBackend::Postgres);
        assert!(config.cors_origins.is_empty());
    }

    #[test]
    fn test_store_backend_parse() {
        assert_eq!("memory".parse::<StoreBackend>(), Ok(StoreBackend::Memory));
        assert_eq!(" Postgres ".parse::<StoreBackend>(), Ok(StoreBackend::Postgres));
        assert!(matches!(
            "redis".parse::<StoreBackend>(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_socket_addr() {
        let config = ApiConfig {
            bind_host: "127.0.0.1".to_string(),
            port: 9090,
            ..ApiConfig::default()
        };
        assert_eq!(config.socket_addr().unwrap().port(), 9090);

        let bad = ApiConfig {
            bind_host: "not a host".to_string(),
            ..ApiConfig::default()
        };
        assert!(bad.socket_addr().is_err());
    }

    #[test]
    fn test_origin_allowed() {
        let mut config = ApiConfig::default();
        assert!(config.is_origin_allowed("https://anything.example"));

        config.cors_origins = vec!["https://replaylens.gg".to_string()];
        assert!(config.is_origin_allowed("https://replaylens.gg"));
        assert!(!config.is_origin_allowed("https://evil.example"));
    }
}
