//! Authentication and authorization failure kinds

use thiserror::Error;

/// Closed set of reasons an auth operation can fail.
///
/// The kind is kept distinct internally for logging. The HTTP boundary
/// decides how much of it to reveal (see `AppError::status_code`).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("malformed token")]
    MalformedToken,

    #[error("token signature mismatch")]
    BadSignature,

    #[error("token has expired")]
    ExpiredToken,

    #[error("unknown subject")]
    UnknownSubject,

    #[error("identity already exists")]
    AlreadyExists,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("insufficient role")]
    InsufficientRole,
}

impl AuthError {
    /// Whether this is a "who are you" failure (401) rather than a
    /// "you may not" (403) or client conflict.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            AuthError::MalformedToken
                | AuthError::BadSignature
                | AuthError::ExpiredToken
                | AuthError::UnknownSubject
                | AuthError::InvalidCredentials
        )
    }

    /// Stable label for log fields and metric labels.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::MalformedToken => "malformed_token",
            AuthError::BadSignature => "bad_signature",
            AuthError::ExpiredToken => "expired_token",
            AuthError::UnknownSubject => "unknown_subject",
            AuthError::AlreadyExists => "already_exists",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::InsufficientRole => "insufficient_role",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authentication_kinds() {
        assert!(AuthError::MalformedToken.is_authentication_failure());
        assert!(AuthError::BadSignature.is_authentication_failure());
        assert!(AuthError::ExpiredToken.is_authentication_failure());
        assert!(AuthError::UnknownSubject.is_authentication_failure());
        assert!(AuthError::InvalidCredentials.is_authentication_failure());

        assert!(!AuthError::InsufficientRole.is_authentication_failure());
        assert!(!AuthError::AlreadyExists.is_authentication_failure());
    }

    #[test]
    fn test_reason_labels_unique() {
        let all = [
            AuthError::MalformedToken,
            AuthError::BadSignature,
            AuthError::ExpiredToken,
            AuthError::UnknownSubject,
            AuthError::AlreadyExists,
            AuthError::InvalidCredentials,
            AuthError::InsufficientRole,
        ];
        let labels: std::collections::HashSet<_> = all.iter().map(|e| e.reason()).collect();
        assert_eq!(labels.len(), all.len());
    }
}
