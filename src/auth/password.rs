//! Password hashing and verification using Argon2id

use crate::{config::SecurityConfig, error::AppError};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher as _, SaltString},
    Algorithm, Argon2, Params, PasswordVerifier as _, Version,
};

/// One-way password hash with constant-time comparison.
pub trait PasswordVerifier: Send + Sync {
    /// Hash a raw password into an opaque, self-describing string
    fn hash(&self, password: &str) -> Result<String, AppError>;

    /// Check a raw password against a stored hash. `Ok(false)` on mismatch.
    fn verify(&self, password: &str, hash: &str) -> Result<bool, AppError>;
}

/// Argon2id hasher with configurable parameters
pub struct PasswordHasher {
    argon2: Argon2<'static>,
}

impl PasswordHasher {
    /// Create hasher with default parameters (OWASP recommended)
    pub fn new() -> Self {
        // m=64MiB, t=3 iterations, p=4 lanes
        Self::with_params(65536, 3, 4).unwrap_or_else(|_| Self {
            argon2: Argon2::default(),
        })
    }

    /// Create hasher with explicit cost parameters (memory in KiB)
    pub fn with_params(m_cost: u32, t_cost: u32, p_cost: u32) -> Result<Self, AppError> {
        let params = Params::new(m_cost, t_cost, p_cost, None)
            .map_err(|e| AppError::Config(format!("Invalid Argon2 params: {}", e)))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Validate password against policy
    pub fn validate_password_policy(
        password: &str,
        policy: &SecurityConfig,
    ) -> Result<(), AppError> {
        // Check length
        if password.chars().count() < policy.password_min_length {
            return Err(AppError::Validation(format!(
                "Password must be at least {} characters",
                policy.password_min_length
            )));
        }

        // Check uppercase
        if policy.password_require_uppercase && !password.chars().any(|c| c.is_uppercase()) {
            return Err(AppError::Validation(
                "Password must contain at least one uppercase letter".to_string(),
            ));
        }

        // Check digit
        if policy.password_require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            return Err(AppError::Validation(
                "Password must contain at least one digit".to_string(),
            ));
        }

        // Check special character
        if policy.password_require_special && !password.chars().any(|c| !c.is_alphanumeric()) {
            return Err(AppError::Validation(
                "Password must contain at least one special character".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl PasswordVerifier for PasswordHasher {
    fn hash(&self, password: &str) -> Result<String, AppError> {
        let salt = SaltString::generate(&mut OsRng);

        let password_hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| {
                tracing::error!("Failed to hash password: {:?}", e);
                AppError::Internal(format!("Failed to hash password: {}", e))
            })?
            .to_string();

        Ok(password_hash)
    }

    fn verify(&self, password: &str, hash: &str) -> Result<bool, AppError> {
        let parsed_hash = PasswordHash::new(hash).map_err(|e| {
            tracing::debug!("Failed to parse password hash: {:?}", e);
            AppError::Internal(format!("Failed to parse password hash: {}", e))
        })?;

        match self.argon2.verify_password(password.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => {
                tracing::error!("Password verification error: {:?}", e);
                Err(AppError::Internal(format!("Password verification error: {}", e)))
            }
        }
    }
}
