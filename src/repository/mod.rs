//! Credential storage layer

pub mod memory;
pub mod user_repo;

pub use memory::InMemoryCredentialStore;
pub use user_repo::PgCredentialStore;

use crate::{error::AppError, models::user::Identity};
use async_trait::async_trait;

/// Persists and retrieves identity records.
///
/// `save` must be an atomic insert-if-absent: concurrent registrations of
/// the same id are serialized here, not in the service.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn exists(&self, id: &str) -> Result<bool, AppError>;

    async fn find(&self, id: &str) -> Result<Option<Identity>, AppError>;

    /// Fails with `AuthError::AlreadyExists` if `identity.id` is taken.
    async fn save(&self, identity: &Identity) -> Result<(), AppError>;

    /// Readiness probe
    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }

    fn backend(&self) -> &'static str;
}
