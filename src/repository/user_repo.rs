//! PostgreSQL credential store (数据库访问层)

use crate::{auth::AuthError, db, error::AppError, models::user::Identity};
use async_trait::async_trait;
use sqlx::PgPool;

use super::CredentialStore;

pub struct PgCredentialStore {
    db: PgPool,
}

impl PgCredentialStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn exists(&self, id: &str) -> Result<bool, AppError> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM identities WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.db)
                .await?;

        Ok(exists)
    }

    async fn find(&self, id: &str) -> Result<Option<Identity>, AppError> {
        let identity = sqlx::query_as::<_, Identity>(
            r#"
            SELECT id, name, email, password_hash, roles, created_at
            FROM identities
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(identity)
    }

    async fn save(&self, identity: &Identity) -> Result<(), AppError> {
        // 主键冲突时不覆盖，由受影响行数判断是否已存在
        let result = sqlx::query(
            r#"
            INSERT INTO identities (id, name, email, password_hash, roles, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&identity.id)
        .bind(&identity.name)
        .bind(&identity.email)
        .bind(&identity.password_hash)
        .bind(&identity.roles)
        .bind(identity.created_at)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AuthError::AlreadyExists.into());
        }

        Ok(())
    }

    async fn ping(&self) -> Result<(), AppError> {
        db::ping(&self.db).await.map_err(|e| {
            tracing::warn!("Database ping failed: {}", e);
            AppError::Database(e)
        })
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}
