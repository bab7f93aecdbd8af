//! Postgres artifact store.
//!
//! Rows live in `parsed_matches`, one per `(match_id, schema_version)`. The
//! pool is created lazily by deadpool; nothing connects until first use.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use replaylens_core::{MatchId, ReplayLensResult, StorageError};
use replaylens_storage::{ArtifactKey, ArtifactRecord, ArtifactStore, NewArtifactRecord};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio_postgres::{NoTls, Row};

use crate::error::{ApiError, ApiResult};

const MIGRATION_0001: &str = include_str!("../migrations/0001_parsed_matches.sql");

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Connection settings. `url`, when set, wins over the discrete fields.
#[derive(Clone)]
pub struct DbConfig {
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    pub pool_size: usize,
    /// How long a request waits for a free connection.
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 5432,
            dbname: "replaylens".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            pool_size: 16,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("url", &self.url.as_ref().map(|_| "<redacted>"))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .field("user", &self.user)
            .field("pool_size", &self.pool_size)
            .field("acquire_timeout", &self.acquire_timeout)
            .finish_non_exhaustive()
    }
}

impl DbConfig {
    /// Read `REPLAYLENS_DATABASE_URL` or the `REPLAYLENS_DB_*` variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: std::env::var("REPLAYLENS_DATABASE_URL")
                .ok()
                .filter(|u| !u.trim().is_empty()),
            host: env_or("REPLAYLENS_DB_HOST", defaults.host),
            port: env_or("REPLAYLENS_DB_PORT", defaults.port),
            dbname: env_or("REPLAYLENS_DB_NAME", defaults.dbname),
            user: env_or("REPLAYLENS_DB_USER", defaults.user),
            password: env_or("REPLAYLENS_DB_PASSWORD", defaults.password),
            pool_size: env_or("REPLAYLENS_DB_POOL_SIZE", defaults.pool_size),
            acquire_timeout: Duration::from_secs(env_or(
                "REPLAYLENS_DB_TIMEOUT",
                defaults.acquire_timeout.as_secs(),
            )),
        }
    }

    fn deadpool_config(&self) -> Config {
        let mut cfg = Config::new();
        match &self.url {
            Some(url) => cfg.url = Some(url.clone()),
            None => {
                cfg.host = Some(self.host.clone());
                cfg.port = Some(self.port);
                cfg.dbname = Some(self.dbname.clone());
                cfg.user = Some(self.user.clone());
                cfg.password = Some(self.password.clone());
            }
        }
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        let mut pool = PoolConfig::new(self.pool_size);
        pool.timeouts.wait = Some(self.acquire_timeout);
        cfg.pool = Some(pool);
        cfg
    }

    pub fn create_pool(&self) -> ApiResult<Pool> {
        self.deadpool_config()
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::persistence(format!("Failed to create pool: {}", e)))
    }
}

// ============================================================================
// POSTGRES ARTIFACT STORE
// ============================================================================

fn backend_error(operation: &str, err: tokio_postgres::Error) -> StorageError {
    tracing::error!(operation, error = ?err, "Database error");
    StorageError::Backend {
        operation: operation.to_string(),
        reason: err.to_string(),
    }
}

/// [`ArtifactStore`] over the `parsed_matches` table.
#[derive(Clone)]
pub struct PgArtifactStore {
    pool: Pool,
}

impl PgArtifactStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        Ok(Self::new(config.create_pool()?))
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    async fn get_conn(&self) -> Result<deadpool_postgres::Object, StorageError> {
        self.pool.get().await.map_err(|e| {
            tracing::error!("Connection pool error: {:?}", e);
            StorageError::PoolUnavailable {
                reason: e.to_string(),
            }
        })
    }

    /// Apply the embedded schema. Idempotent.
    pub async fn migrate(&self) -> ReplayLensResult<()> {
        let conn = self.get_conn().await?;
        conn.batch_execute(MIGRATION_0001)
            .await
            .map_err(|e| backend_error("migrate", e))?;
        tracing::info!("Applied parsed_matches migration");
        Ok(())
    }
}

fn record_from_row(row: &Row) -> Result<ArtifactRecord, StorageError> {
    let decode = |e: tokio_postgres::Error| backend_error("decode_row", e);
    let match_id: i64 = row.try_get("match_id").map_err(decode)?;
    let schema_version: i32 = row.try_get("schema_version").map_err(decode)?;
    let artifact_data: serde_json::Value = row.try_get("artifact_data").map_err(decode)?;
    let etag: String = row.try_get("etag").map_err(decode)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(decode)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(decode)?;
    Ok(ArtifactRecord {
        key: ArtifactKey::new(MatchId::new(match_id), schema_version),
        artifact_data,
        etag,
        created_at,
        updated_at,
    })
}

#[async_trait]
impl ArtifactStore for PgArtifactStore {
    async fn get(&self, key: ArtifactKey) -> ReplayLensResult<Option<ArtifactRecord>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                "SELECT match_id, schema_version, artifact_data, etag, created_at, updated_at \
                 FROM parsed_matches WHERE match_id = $1 AND schema_version = $2",
                &[&key.match_id.get(), &key.schema_version],
            )
            .await
            .map_err(|e| backend_error("get", e))?;
        Ok(row.as_ref().map(record_from_row).transpose()?)
    }

    async fn upsert(&self, record: NewArtifactRecord) -> ReplayLensResult<ArtifactRecord> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_one(
                "INSERT INTO parsed_matches \
                     (match_id, schema_version, raw_payload_gzip, artifact_data, etag) \
                 VALUES ($1, $2, $3, $4, $5) \
                 ON CONFLICT (match_id, schema_version) DO UPDATE SET \
                     raw_payload_gzip = EXCLUDED.raw_payload_gzip, \
                     artifact_data = EXCLUDED.artifact_data, \
                     etag = EXCLUDED.etag, \
                     updated_at = now() \
                 RETURNING match_id, schema_version, artifact_data, etag, created_at, updated_at",
                &[
                    &record.key.match_id.get(),
                    &record.key.schema_version,
                    &record.raw_payload_gzip,
                    &record.artifact_data,
                    &record.etag,
                ],
            )
            .await
            .map_err(|e| backend_error("upsert", e))?;
        tracing::debug!(key = %record.key, bytes = record.raw_payload_gzip.len(), "Upserted artifact");
        Ok(record_from_row(&row)?)
    }

    async fn raw_payload(&self, key: ArtifactKey) -> ReplayLensResult<Option<Vec<u8>>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                "SELECT raw_payload_gzip FROM parsed_matches \
                 WHERE match_id = $1 AND schema_version = $2",
                &[&key.match_id.get(), &key.schema_version],
            )
            .await
            .map_err(|e| backend_error("raw_payload", e))?;
        match row {
            Some(row) => Ok(Some(
                row.try_get::<_, Vec<u8>>("raw_payload_gzip")
                    .map_err(|e| backend_error("raw_payload", e))?,
            )),
            None => Ok(None),
        }
    }

    async fn ping(&self) -> ReplayLensResult<()> {
        let conn = self.get_conn().await?;
        conn.simple_query("SELECT 1")
            .await
            .map_err(|e| backend_error("ping", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_replaces_discrete_fields() {
        let config = DbConfig {
            url: Some("postgres://u:secret@db:6543/matches".to_string()),
            ..DbConfig::default()
        };
        let cfg = config.deadpool_config();
        assert_eq!(cfg.url.as_deref(), Some("postgres://u:secret@db:6543/matches"));
        assert!(cfg.host.is_none());
        assert_eq!(cfg.pool.map(|p| p.max_size), Some(16));
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let config = DbConfig {
            url: Some("postgres://u:secret@db/matches".to_string()),
            password: "hunter2".to_string(),
            ..DbConfig::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("secret"));
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_migration_declares_unique_key() {
        assert!(MIGRATION_0001.contains("UNIQUE (match_id, schema_version)"));
        assert!(MIGRATION_0001.contains("raw_payload_gzip BYTEA"));
        assert!(MIGRATION_0001.contains("artifact_data    JSONB"));
    }

    #[tokio::test]
    async fn test_create_pool_is_lazy() {
        let pool = DbConfig {
            port: 1,
            ..DbConfig::default()
        }
        .create_pool();
        assert!(pool.is_ok());
    }
}
