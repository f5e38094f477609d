//! In-process credential store

use crate::{auth::AuthError, error::AppError, models::user::Identity};
use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};

use super::CredentialStore;

#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    identities: DashMap<String, Identity>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn exists(&self, id: &str) -> Result<bool, AppError> {
        Ok(self.identities.contains_key(id))
    }

    async fn find(&self, id: &str) -> Result<Option<Identity>, AppError> {
        Ok(self.identities.get(id).map(|entry| entry.value().clone()))
    }

    async fn save(&self, identity: &Identity) -> Result<(), AppError> {
        match self.identities.entry(identity.id.clone()) {
            Entry::Occupied(_) => Err(AuthError::AlreadyExists.into()),
            Entry::Vacant(slot) => {
                slot.insert(identity.clone());
                Ok(())
            }
        }
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
