//! JWT 认证中间件
//!
//! `authenticate` resolves the caller once per request and stores an
//! [`AuthContext`] in the request extensions. `authorize` then applies the
//! [`AccessPolicy`](super::policy::AccessPolicy) before any handler runs.

use crate::{
    auth::{
        clock::Clock,
        error::AuthError,
        jwt::TokenCodec,
        policy::AccessDecision,
    },
    error::AppError,
    middleware::AppState,
    repository::CredentialStore,
};
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Duration;

/// Literal scheme prefix of the only accepted credential transport
pub const BEARER_PREFIX: &str = "Bearer ";

/// Resolved caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub name: String,
    pub email: String,
    pub roles: Vec<String>,
}

/// Request-scoped authentication state
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthContext {
    /// No credential was presented
    #[default]
    Anonymous,
    Authenticated(Principal),
}

impl AuthContext {
    pub fn authenticated(id: String, name: String, email: String, roles: Vec<String>) -> Self {
        AuthContext::Authenticated(Principal {
            id,
            name,
            email,
            roles,
        })
    }

    pub fn principal(&self) -> Option<&Principal> {
        match self {
            AuthContext::Anonymous => None,
            AuthContext::Authenticated(principal) => Some(principal),
        }
    }

    /// `None` for anonymous callers
    pub fn roles(&self) -> Option<&[String]> {
        self.principal().map(|p| p.roles.as_slice())
    }
}

// 实现 FromRequestParts 以便在 handler 中直接提取 AuthContext
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<AuthContext>().cloned().unwrap_or_default())
    }
}

// Handlers that take a `Principal` can only run for authenticated callers
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .and_then(|ctx| ctx.principal())
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

/// 从 Authorization 头提取令牌
///
/// `Ok(None)` when no credential is present. A present header that is not
/// exactly `Bearer <token>` is a malformed credential.
pub fn extract_token(headers: &HeaderMap) -> Result<Option<&str>, AuthError> {
    let mut values = headers.get_all(AUTHORIZATION).iter();

    let Some(value) = values.next() else {
        return Ok(None);
    };
    if values.next().is_some() {
        return Err(AuthError::MalformedToken);
    }

    let value = value.to_str().map_err(|_| AuthError::MalformedToken)?;
    let token = value
        .strip_prefix(BEARER_PREFIX)
        .ok_or(AuthError::MalformedToken)?;

    if token.is_empty() || token.contains(char::is_whitespace) {
        return Err(AuthError::MalformedToken);
    }

    Ok(Some(token))
}

/// Turns request headers into an [`AuthContext`].
pub struct RequestAuthenticator {
    codec: Arc<TokenCodec>,
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    store_timeout: Duration,
}

impl RequestAuthenticator {
    pub fn new(
        codec: Arc<TokenCodec>,
        store: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            codec,
            store,
            clock,
            store_timeout,
        }
    }

    /// Resolve the caller. Holds no state between calls, so resolving the
    /// same headers twice yields the same context.
    pub async fn resolve(&self, headers: &HeaderMap) -> Result<AuthContext, AppError> {
        let Some(token) = extract_token(headers)? else {
            return Ok(AuthContext::Anonymous);
        };

        let verified = self.codec.verify(token, self.clock.now())?;

        let identity = tokio::time::timeout(self.store_timeout, self.store.find(&verified.subject))
            .await
            .map_err(|_| AppError::timeout("credential store lookup"))??
            .ok_or(AuthError::UnknownSubject)?;

        if identity.roles != verified.roles {
            tracing::debug!(
                subject = %identity.id,
                token_id = %verified.token_id,
                "Token roles differ from stored roles, using stored roles"
            );
        }

        Ok(AuthContext::authenticated(
            identity.id,
            identity.name,
            identity.email,
            identity.roles,
        ))
    }
}

/// JWT 认证中间件
///
/// Any failure with a present credential rejects the request here with a
/// single opaque 401; the specific reason is only logged.
pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ctx = match state.authenticator.resolve(req.headers()).await {
        Ok(ctx) => ctx,
        Err(err) => {
            let reason = err.auth_kind().map_or("store_unavailable", |k| k.reason());
            tracing::warn!(
                reason,
                error = %err,
                path = %req.uri().path(),
                "Request authentication failed"
            );
            metrics::counter!("auth_failures_total", "reason" => reason).increment(1);
            return Err(AppError::Unauthorized);
        }
    };

    if let Some(principal) = ctx.principal() {
        tracing::debug!(subject = %principal.id, "Request authenticated");
    }

    // 附加到请求扩展（覆盖任何已有上下文）
    req.extensions_mut().insert(ctx);

    Ok(next.run(req).await)
}

/// 访问策略中间件，必须在 `authenticate` 之后运行
pub async fn authorize(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let anonymous = AuthContext::Anonymous;
    let ctx = req.extensions().get::<AuthContext>().unwrap_or(&anonymous);
    let path = req.uri().path();

    match state.policy.evaluate(path, ctx) {
        AccessDecision::Allow => Ok(next.run(req).await),
        AccessDecision::Unauthenticated => {
            tracing::info!(path = %path, "Anonymous request to protected route");
            metrics::counter!("auth_failures_total", "reason" => "missing_credential")
                .increment(1);
            Err(AppError::Unauthorized)
        }
        AccessDecision::Forbidden => {
            tracing::warn!(
                path = %path,
                subject = ctx.principal().map(|p| p.id.as_str()).unwrap_or_default(),
                "Insufficient role for route"
            );
            metrics::counter!("authz_denials_total").increment(1);
            Err(AuthError::InsufficientRole.into())
        }
    }
}
