//! JWT token issuance and verification
//! HS256-signed, self-contained identity tokens with a fixed TTL

use crate::{auth::error::AuthError, config::AppConfig, error::AppError};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Minimum HS256 key length in bytes
const MIN_SECRET_LEN: usize = 32;

/// JWT claims
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject (identity id)
    pub sub: String,

    /// Roles held by the subject at issuance
    pub roles: Vec<String>,

    /// Issued at (unix seconds)
    pub iat: i64,

    /// Expiration (unix seconds)
    pub exp: i64,

    /// JWT ID (unique token identifier, used for log correlation)
    pub jti: String,
}

/// Payload of a token that passed signature, structure and expiry checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub subject: String,
    pub roles: Vec<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub token_id: String,
}

/// Token codec. Owns the signing secret and the claim schema.
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenCodec {
    /// Create codec from config
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        Self::new(
            config.security.jwt_secret.expose_secret().as_bytes(),
            Duration::seconds(config.security.token_ttl_secs as i64),
        )
    }

    pub fn new(secret: &[u8], ttl: Duration) -> Result<Self, AppError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(AppError::Config(format!(
                "JWT secret too short (min {} chars)",
                MIN_SECRET_LEN
            )));
        }
        if ttl <= Duration::zero() {
            return Err(AppError::Config("Token TTL must be positive".to_string()));
        }

        // Expiry is checked against the caller's clock in `verify`, not the
        // library's wall clock.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.required_spec_claims =
            HashSet::from(["exp".to_string(), "sub".to_string()]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl,
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token for `subject` carrying `roles`, valid over `[now, now + ttl)`.
    pub fn issue(
        &self,
        subject: &str,
        roles: &[String],
        now: DateTime<Utc>,
    ) -> Result<String, AppError> {
        let iat = now.timestamp();
        let claims = Claims {
            sub: subject.to_string(),
            roles: roles.to_vec(),
            iat,
            exp: iat + self.ttl.num_seconds(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(|e| {
            tracing::error!("Failed to encode token: {:?}", e);
            AppError::Internal(format!("Failed to encode token: {}", e))
        })
    }

    /// Validate and decode a token at instant `now`.
    ///
    /// `now` is truncated to whole seconds before the `exp` comparison, while
    /// `iat` was truncated at issue time. A token can therefore stop verifying
    /// up to one second before `issued_at + ttl` measured on the sub-second
    /// clock, never after.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<VerifiedToken, AuthError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                tracing::debug!("Token decoding failed: {:?}", e);
                match e.kind() {
                    ErrorKind::InvalidSignature => AuthError::BadSignature,
                    ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                    _ => AuthError::MalformedToken,
                }
            })?
            .claims;

        if claims.sub.is_empty() || claims.exp <= claims.iat {
            return Err(AuthError::MalformedToken);
        }

        if now.timestamp() >= claims.exp {
            return Err(AuthError::ExpiredToken);
        }

        let issued_at = DateTime::from_timestamp(claims.iat, 0).ok_or(AuthError::MalformedToken)?;
        let expires_at =
            DateTime::from_timestamp(claims.exp, 0).ok_or(AuthError::MalformedToken)?;

        Ok(VerifiedToken {
            subject: claims.sub,
            roles: claims.roles,
            issued_at,
            expires_at,
            token_id: claims.jti,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test_secret_key_32_characters_long!";

    fn codec() -> TokenCodec {
        TokenCodec::new(SECRET, Duration::minutes(50)).unwrap()
    }

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_issue_and_verify() {
        let codec = codec();
        let roles = vec!["ADMIN".to_string()];

        let token = codec.issue("u1", &roles, t0()).unwrap();
        let verified = codec.verify(&token, t0()).unwrap();

        assert_eq!(verified.subject, "u1");
        assert_eq!(verified.roles, roles);
        assert_eq!(verified.issued_at, t0());
        assert_eq!(verified.expires_at, t0() + Duration::minutes(50));
        assert!(!verified.token_id.is_empty());
    }

    #[test]
    fn test_expiry_boundary() {
        let codec = codec();
        let token = codec.issue("u1", &[], t0()).unwrap();

        let last_valid = t0() + Duration::minutes(50) - Duration::seconds(1);
        assert!(codec.verify(&token, last_valid).is_ok());

        let boundary = t0() + Duration::minutes(50);
        assert_eq!(codec.verify(&token, boundary), Err(AuthError::ExpiredToken));
    }

    #[test]
    fn test_subsecond_issue_expires_early() {
        let codec = codec();
        let issued = t0() + Duration::milliseconds(900);
        let token = codec.issue("u1", &[], issued).unwrap();

        // exp 按整秒计算：比 issued + ttl 早 900ms 失效
        let verified = codec.verify(&token, issued).unwrap();
        assert_eq!(verified.issued_at, t0());
        assert_eq!(verified.expires_at, t0() + Duration::minutes(50));

        let before_nominal_expiry = issued + Duration::minutes(50) - Duration::milliseconds(500);
        assert_eq!(
            codec.verify(&token, before_nominal_expiry),
            Err(AuthError::ExpiredToken)
        );
    }

    #[test]
    fn test_secret_too_short() {
        assert!(TokenCodec::new(b"short", Duration::minutes(50)).is_err());
    }

    #[test]
    fn test_other_secret_rejected() {
        let token = codec().issue("u1", &[], t0()).unwrap();
        let other =
            TokenCodec::new(b"another_secret_key_32_characters!!", Duration::minutes(50)).unwrap();

        assert_eq!(other.verify(&token, t0()), Err(AuthError::BadSignature));
    }

    #[test]
    fn test_invalid_token_fails() {
        assert_eq!(codec().verify("invalid_token", t0()), Err(AuthError::MalformedToken));
        assert_eq!(codec().verify("", t0()), Err(AuthError::MalformedToken));
    }
}
