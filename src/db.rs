//! 凭据存储后端的选择与 PostgreSQL 连接管理

use crate::{
    config::DatabaseConfig,
    repository::{CredentialStore, InMemoryCredentialStore, PgCredentialStore},
};
use secrecy::{ExposeSecret, Secret};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::Arc;
use std::time::Duration;

/// 数据库错误类型
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

/// Select the credential store for this configuration.
///
/// With `database.url` set, connects, applies migrations and returns the
/// PostgreSQL store. Without it, identities live in memory and are lost on
/// restart.
pub async fn connect_store(config: &DatabaseConfig) -> Result<Arc<dyn CredentialStore>, DbError> {
    let Some(url) = &config.url else {
        tracing::warn!("No database configured, identities are kept in memory only");
        return Ok(Arc::new(InMemoryCredentialStore::new()));
    };

    let pool = create_pool(url, config).await?;
    run_migrations(&pool).await?;

    Ok(Arc::new(PgCredentialStore::new(pool)))
}

fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
        .test_before_acquire(true)
}

/// 创建数据库连接池
pub async fn create_pool(url: &Secret<String>, config: &DatabaseConfig) -> Result<PgPool, DbError> {
    let pool = pool_options(config)
        .connect(url.expose_secret())
        .await
        .map_err(|e| {
            tracing::error!("Failed to create database pool: {}", e);
            DbError::ConnectionFailed(e.to_string())
        })?;

    tracing::info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Database pool created"
    );

    Ok(pool)
}

/// 运行 identities 表迁移
pub async fn run_migrations(pool: &PgPool) -> Result<(), DbError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| {
            tracing::error!("Migration failed: {}", e);
            DbError::MigrationFailed(e.to_string())
        })?;

    tracing::info!("Migrations applied");
    Ok(())
}

/// Round-trip a trivial query; used by the readiness check
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: Option<&str>) -> DatabaseConfig {
        DatabaseConfig {
            url: url.map(|u| Secret::new(u.to_string())),
            max_connections: 7,
            min_connections: 2,
            acquire_timeout_secs: 1,
            idle_timeout_secs: 60,
            max_lifetime_secs: 600,
        }
    }

    #[test]
    fn test_pool_options_follow_config() {
        let options = pool_options(&config(None));
        assert_eq!(options.get_max_connections(), 7);
        assert_eq!(options.get_min_connections(), 2);
        assert_eq!(options.get_acquire_timeout(), Duration::from_secs(1));
        assert_eq!(options.get_idle_timeout(), Some(Duration::from_secs(60)));
        assert_eq!(options.get_max_lifetime(), Some(Duration::from_secs(600)));
    }

    #[tokio::test]
    async fn test_connect_store_without_url_uses_memory() {
        let store = connect_store(&config(None)).await.unwrap();
        assert_eq!(store.backend(), "memory");
        assert!(store.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_connect_store_rejects_bad_url() {
        let result = connect_store(&config(Some("not-a-database-url"))).await;
        assert!(matches!(result, Err(DbError::ConnectionFailed(_))));
    }
}
