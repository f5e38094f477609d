//! HTTP 中间件与应用状态
//! 请求追踪；认证与授权中间件见 `auth::middleware`

use crate::{
    auth::{
        clock::Clock, jwt::TokenCodec, middleware::RequestAuthenticator,
        password::PasswordVerifier, policy::AccessPolicy,
    },
    config::AppConfig,
    error::AppError,
    repository::CredentialStore,
    services::AuthService,
};
use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;
use uuid::Uuid;

tokio::task_local! {
    static CURRENT_REQUEST_ID: String;
}

/// 当前请求的 request_id，同时放入请求扩展供 handler 提取
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

/// request_id of the request being served on this task, if any
pub fn current_request_id() -> Option<String> {
    CURRENT_REQUEST_ID.try_with(|id| id.clone()).ok()
}

/// 应用状态
///
/// 所有组件以 Arc 共享，请求之间不持有可变状态。
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn CredentialStore>,
    pub codec: Arc<TokenCodec>,
    pub clock: Arc<dyn Clock>,
    pub auth_service: Arc<AuthService>,
    pub authenticator: Arc<RequestAuthenticator>,
    pub policy: Arc<AccessPolicy>,
}

impl AppState {
    /// Wire every component from one configuration
    pub fn new(
        config: AppConfig,
        store: Arc<dyn CredentialStore>,
        hasher: Arc<dyn PasswordVerifier>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AppError> {
        let config = Arc::new(config);
        let codec = Arc::new(TokenCodec::from_config(&config)?);
        let policy = Arc::new(AccessPolicy::default_rules(&config.roles)?);

        let auth_service = Arc::new(AuthService::new(
            store.clone(),
            hasher,
            codec.clone(),
            config.clone(),
        ));
        let authenticator = Arc::new(RequestAuthenticator::new(
            codec.clone(),
            store.clone(),
            clock.clone(),
            Duration::from_millis(config.security.store_timeout_ms),
        ));

        Ok(Self {
            config,
            store,
            codec,
            clock,
            auth_service,
            authenticator,
            policy,
        })
    }
}

/// 请求追踪中间件
/// 为每个请求生成 trace_id 和 request_id，并记录指标
pub async fn request_tracking_middleware(mut req: Request, next: Next) -> Response {
    let trace_id = extract_or_generate_trace_id(req.headers());
    let request_id = Uuid::new_v4().to_string();
    req.extensions_mut().insert(RequestId(request_id.clone()));

    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let span = tracing::info_span!(
        "http_request",
        trace_id = %trace_id,
        request_id = %request_id,
        method = %method,
        path = %path,
    );

    async move {
        let start = Instant::now();

        // 错误响应体中的 request_id 从这里读取
        let mut response = CURRENT_REQUEST_ID
            .scope(request_id.clone(), next.run(req))
            .await;

        let elapsed = start.elapsed();
        let status = response.status().as_u16();

        // 标签使用静态字符串，避免高基数
        let method_name = match method.as_str() {
            "GET" => "GET",
            "POST" => "POST",
            "PUT" => "PUT",
            "DELETE" => "DELETE",
            "PATCH" => "PATCH",
            _ => "UNKNOWN",
        };
        let status_code = match status {
            200 => "200",
            201 => "201",
            400 => "400",
            401 => "401",
            403 => "403",
            404 => "404",
            409 => "409",
            500 => "500",
            503 => "503",
            _ => "other",
        };

        metrics::counter!("http_requests_total", "method" => method_name, "status" => status_code)
            .increment(1);
        metrics::histogram!("http_request_duration_seconds").record(elapsed.as_secs_f64());

        tracing::info!(
            status = status,
            elapsed_ms = elapsed.as_millis(),
            "Request completed"
        );

        if let Ok(value) = HeaderValue::from_str(&trace_id) {
            response.headers_mut().insert("x-trace-id", value);
        }
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert("x-request-id", value);
        }

        response
    }
    .instrument(span)
    .await
}

/// 从请求头中提取或生成 trace_id
fn extract_or_generate_trace_id(headers: &HeaderMap) -> String {
    headers
        .get("x-trace-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty() && s.len() <= 128)
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}
