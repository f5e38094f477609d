//! 测试公共模块
//! 提供测试辅助函数和测试工具
#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::{DateTime, Utc};
use http_body_util::BodyExt;
use rbac_service::{
    auth::{clock::ManualClock, password::PasswordHasher},
    config::{
        AppConfig, DatabaseConfig, LoggingConfig, RolesConfig, SecurityConfig, ServerConfig,
    },
    middleware::AppState,
    repository::InMemoryCredentialStore,
    routes,
};
use secrecy::Secret;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

pub const TEST_SECRET: &str = "test-secret-key-for-testing-only-min-32-chars";
pub const TEST_TTL_SECS: u64 = 3000;
pub const TEST_PASSWORD: &str = "correct-horse-battery";

/// 固定起始时间，测试通过 ManualClock 推进
pub fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

/// 创建测试配置
pub fn create_test_config() -> AppConfig {
    AppConfig {
        server: ServerConfig {
            addr: "127.0.0.1:0".to_string(), // 使用随机端口
            graceful_shutdown_timeout_secs: 5,
        },
        database: DatabaseConfig {
            url: None,
            max_connections: 5,
            min_connections: 1,
            acquire_timeout_secs: 5,
            idle_timeout_secs: 300,
            max_lifetime_secs: 1800,
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
            format: "pretty".to_string(),
        },
        security: SecurityConfig {
            jwt_secret: Secret::new(TEST_SECRET.to_string()),
            token_ttl_secs: TEST_TTL_SECS,
            password_min_length: 8,
            password_require_uppercase: false,
            password_require_digit: false,
            password_require_special: false,
            reveal_unknown_subject: false,
            store_timeout_ms: 2000,
        },
        roles: RolesConfig::default(),
    }
}

/// 低成本参数的哈希器，避免测试耗时
pub fn fast_hasher() -> PasswordHasher {
    PasswordHasher::with_params(1024, 1, 1).unwrap()
}

/// 测试应用：内存存储 + 手动时钟
pub struct TestApp {
    pub state: Arc<AppState>,
    pub store: Arc<InMemoryCredentialStore>,
    pub clock: Arc<ManualClock>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(create_test_config())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let store = Arc::new(InMemoryCredentialStore::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let state = Arc::new(
            AppState::new(config, store.clone(), Arc::new(fast_hasher()), clock.clone())
                .expect("Failed to build app state"),
        );

        Self {
            state,
            store,
            clock,
        }
    }

    pub fn router(&self) -> Router {
        routes::create_router(self.state.clone())
    }

    /// 发送请求，返回状态码与 JSON 响应体
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    /// 注册并返回令牌
    pub async fn register(&self, id: &str, roles: &[&str]) -> String {
        let (status, body) = self
            .send(post_json(
                "/v1/auth/register",
                json!({
                    "id": id,
                    "name": format!("{} name", id),
                    "email": format!("{}@example.com", id),
                    "password": TEST_PASSWORD,
                    "roles": roles,
                }),
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
        body["token"].as_str().unwrap().to_string()
    }

    pub async fn login(&self, id: &str, password: &str) -> (StatusCode, Value) {
        self.send(post_json(
            "/v1/auth/login",
            json!({ "id": id, "password": password }),
        ))
        .await
    }
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn get_with_token(uri: &str, token: &str) -> Request<Body> {
    get_with_authorization(uri, &format!("Bearer {}", token))
}

pub fn get_with_authorization(uri: &str, value: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header(header::AUTHORIZATION, value)
        .body(Body::empty())
        .unwrap()
}

/// 断言通用认证失败响应
pub fn assert_auth_failed(status: StatusCode, body: &Value) {
    assert_eq!(status, StatusCode::UNAUTHORIZED, "body: {}", body);
    assert_eq!(body["error"]["code"], 401);
    assert_eq!(body["error"]["message"], "Authentication failed");
    assert!(body["error"]["request_id"].is_string());
}
