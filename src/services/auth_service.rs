//! 认证服务：注册、登录

use crate::{
    auth::{error::AuthError, jwt::TokenCodec, password::PasswordHasher, PasswordVerifier},
    config::AppConfig,
    error::AppError,
    models::{auth::*, user::Identity},
    repository::CredentialStore,
};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use validator::Validate;

/// Fixed input for the hash that unknown-id logins are checked against
const DUMMY_PASSWORD: &str = "rbac-service-dummy-password";

pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    hasher: Arc<dyn PasswordVerifier>,
    codec: Arc<TokenCodec>,
    config: Arc<AppConfig>,
    /// 与真实记录同参数的哈希，未知 id 登录时也执行一次验证
    dummy_hash: String,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        hasher: Arc<dyn PasswordVerifier>,
        codec: Arc<TokenCodec>,
        config: Arc<AppConfig>,
    ) -> Self {
        let dummy_hash = hasher.hash(DUMMY_PASSWORD).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to prepare dummy password hash");
            String::new()
        });

        Self {
            store,
            hasher,
            codec,
            config,
            dummy_hash,
        }
    }

    /// 注册新身份并签发令牌
    ///
    /// The stored record keeps only the password hash. On an id collision
    /// the existing record is left untouched.
    pub async fn register(
        &self,
        req: RegisterRequest,
        now: DateTime<Utc>,
    ) -> Result<(Identity, String), AppError> {
        req.validate()?;

        if let Some(role) = req.roles.iter().find(|r| !self.config.roles.is_known(r)) {
            return Err(AppError::Validation(format!("Unknown role: {}", role)));
        }

        PasswordHasher::validate_password_policy(&req.password, &self.config.security)?;

        if self.with_timeout("exists", self.store.exists(&req.id)).await? {
            tracing::info!(id = %req.id, "Registration rejected, id already taken");
            return Err(AuthError::AlreadyExists.into());
        }

        let password_hash = self.hasher.hash(&req.password)?;
        let identity = Identity::new(req.id, req.name, req.email, password_hash, req.roles, now);

        // 并发注册时由存储层保证只有一个成功
        self.with_timeout("save", self.store.save(&identity)).await?;

        let token = self.codec.issue(&identity.id, &identity.roles, now)?;

        tracing::info!(
            id = %identity.id,
            roles = ?identity.roles,
            backend = self.store.backend(),
            "Identity registered"
        );

        Ok((identity, token))
    }

    /// 用户登录
    pub async fn login(&self, req: LoginRequest, now: DateTime<Utc>) -> Result<String, AppError> {
        req.validate()?;

        let Some(identity) = self.with_timeout("find", self.store.find(&req.id)).await? else {
            // Same Argon2 cost as a wrong password, so response time does not reveal the id
            let _ = self.hasher.verify(&req.password, &self.dummy_hash);
            tracing::warn!(id = %req.id, reason = "unknown_subject", "Login failed");
            return Err(if self.config.security.reveal_unknown_subject {
                AuthError::UnknownSubject.into()
            } else {
                AuthError::InvalidCredentials.into()
            });
        };

        if !self.hasher.verify(&req.password, &identity.password_hash)? {
            tracing::warn!(id = %identity.id, reason = "invalid_credentials", "Login failed");
            return Err(AuthError::InvalidCredentials.into());
        }

        // 令牌中的角色取自存储记录，而非请求
        let token = self.codec.issue(&identity.id, &identity.roles, now)?;

        tracing::info!(id = %identity.id, "Login succeeded");

        Ok(token)
    }

    async fn with_timeout<T>(
        &self,
        op: &str,
        fut: impl Future<Output = Result<T, AppError>>,
    ) -> Result<T, AppError> {
        let limit = Duration::from_millis(self.config.security.store_timeout_ms);
        tokio::time::timeout(limit, fut).await.map_err(|_| {
            tracing::error!(
                op,
                timeout_ms = self.config.security.store_timeout_ms,
                "Credential store call timed out"
            );
            AppError::Timeout(format!("credential store {}", op))
        })?
    }
}
