//! Identity domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Registered principal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Identity {
    /// Unique, stable id; used as the token subject
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub roles: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Identity {
    /// Roles are deduplicated, first occurrence wins.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
        roles: Vec<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: email.into(),
            password_hash: password_hash.into(),
            roles: normalize_roles(roles),
            created_at,
        }
    }
}

/// Drop duplicate role names while keeping their first-seen order
pub fn normalize_roles(roles: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(roles.len());
    for role in roles {
        if !out.contains(&role) {
            out.push(role);
        }
    }
    out
}

/// Identity response (no password hash)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdentityResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub roles: Vec<String>,
}

impl From<Identity> for IdentityResponse {
    fn from(identity: Identity) -> Self {
        Self {
            id: identity.id,
            name: identity.name,
            email: identity.email,
            roles: identity.roles,
        }
    }
}
