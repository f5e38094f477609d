//! 凭据存储故障时的请求认证测试

use async_trait::async_trait;
use axum::{
    extract::Extension,
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    Router,
};
use http_body_util::BodyExt;
use rbac_service::{
    auth::{clock::ManualClock, middleware::{authenticate, authorize}},
    error::AppError,
    middleware::{request_tracking_middleware, AppState, RequestId},
    models::user::Identity,
    repository::{CredentialStore, InMemoryCredentialStore},
    routes,
};
use serde_json::{json, Value};
use std::sync::{
    atomic::{AtomicU8, AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;
use tower::ServiceExt;

mod common;
use common::{
    assert_auth_failed, create_test_config, fast_hasher, get_with_token, post_json, t0,
    TEST_PASSWORD,
};

const HEALTHY: u8 = 0;
const FAILING: u8 = 1;
const HANGING: u8 = 2;

/// In-memory store whose lookups can be switched to fail or hang
struct FlakyStore {
    inner: InMemoryCredentialStore,
    mode: AtomicU8,
}

impl FlakyStore {
    fn new() -> Self {
        Self {
            inner: InMemoryCredentialStore::new(),
            mode: AtomicU8::new(HEALTHY),
        }
    }

    fn set_mode(&self, mode: u8) {
        self.mode.store(mode, Ordering::SeqCst);
    }

    async fn gate(&self) -> Result<(), AppError> {
        match self.mode.load(Ordering::SeqCst) {
            FAILING => Err(AppError::Internal("connection reset".to_string())),
            HANGING => {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl CredentialStore for FlakyStore {
    async fn exists(&self, id: &str) -> Result<bool, AppError> {
        self.gate().await?;
        self.inner.exists(id).await
    }

    async fn find(&self, id: &str) -> Result<Option<Identity>, AppError> {
        self.gate().await?;
        self.inner.find(id).await
    }

    async fn save(&self, identity: &Identity) -> Result<(), AppError> {
        self.gate().await?;
        self.inner.save(identity).await
    }

    fn backend(&self) -> &'static str {
        "flaky"
    }
}

struct Harness {
    state: Arc<AppState>,
    store: Arc<FlakyStore>,
    hits: Arc<AtomicUsize>,
}

impl Harness {
    async fn new() -> Self {
        let mut config = create_test_config();
        config.security.store_timeout_ms = 50;

        let store = Arc::new(FlakyStore::new());
        store
            .save(&Identity::new(
                "u1",
                "User One",
                "u1@example.com",
                fast_hasher_hash(),
                vec!["USER".into()],
                t0(),
            ))
            .await
            .unwrap();

        let state = Arc::new(
            AppState::new(
                config,
                store.clone(),
                Arc::new(fast_hasher()),
                Arc::new(ManualClock::new(t0())),
            )
            .unwrap(),
        );

        Self {
            state,
            store,
            hits: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn token(&self) -> String {
        self.state
            .codec
            .issue("u1", &["USER".to_string()], t0())
            .unwrap()
    }

    /// Router whose handlers count how often they run
    fn counting_router(&self) -> Router {
        let hits = self.hits.clone();
        let handler = move |Extension(request_id): Extension<RequestId>| {
            let hits = hits.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                request_id.0
            }
        };

        Router::new()
            .route("/v1/resources/user", get(handler.clone()))
            .route("/health", get(handler))
            .layer(from_fn_with_state(self.state.clone(), authorize))
            .layer(from_fn_with_state(self.state.clone(), authenticate))
            .layer(from_fn(request_tracking_middleware))
            .with_state(self.state.clone())
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

fn fast_hasher_hash() -> String {
    use rbac_service::auth::PasswordVerifier;
    fast_hasher().hash(TEST_PASSWORD).unwrap()
}

async fn send(router: Router, request: axum::http::Request<axum::body::Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_healthy_store_reaches_handler() {
    let harness = Harness::new().await;

    let response = harness
        .counting_router()
        .oneshot(get_with_token("/v1/resources/user", &harness.token()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(harness.hits(), 1);

    // The handler sees the same id the tracking layer put in the header
    let header = response.headers()["x-request-id"].to_str().unwrap().to_string();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(bytes, header.as_bytes());
}

#[tokio::test]
async fn test_failing_store_rejects_before_handler() {
    let harness = Harness::new().await;
    harness.store.set_mode(FAILING);

    for path in ["/v1/resources/user", "/health"] {
        let (status, body) = send(
            harness.counting_router(),
            get_with_token(path, &harness.token()),
        )
        .await;
        assert_auth_failed(status, &body);
    }
    assert_eq!(harness.hits(), 0);
}

#[tokio::test]
async fn test_hanging_store_times_out_before_handler() {
    let harness = Harness::new().await;
    harness.store.set_mode(HANGING);

    let (status, body) = tokio::time::timeout(
        Duration::from_secs(5),
        send(
            harness.counting_router(),
            get_with_token("/v1/resources/user", &harness.token()),
        ),
    )
    .await
    .expect("authentication did not honor the store timeout");

    assert_auth_failed(status, &body);
    assert_eq!(harness.hits(), 0);
}

#[tokio::test]
async fn test_failing_store_on_full_router() {
    let harness = Harness::new().await;
    let router = routes::create_router(harness.state.clone());

    let (status, _) = send(router.clone(), get_with_token("/v1/me", &harness.token())).await;
    assert_eq!(status, StatusCode::OK);

    harness.store.set_mode(FAILING);
    for path in ["/v1/me", "/v1/resources/user", "/health"] {
        let (status, body) = send(router.clone(), get_with_token(path, &harness.token())).await;
        assert_auth_failed(status, &body);
    }
}

#[tokio::test]
async fn test_login_with_hanging_store_is_unavailable() {
    let harness = Harness::new().await;
    harness.store.set_mode(HANGING);

    let (status, body) = send(
        routes::create_router(harness.state.clone()),
        post_json(
            "/v1/auth/login",
            json!({ "id": "u1", "password": TEST_PASSWORD }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], 503);
    assert_eq!(body["error"]["message"], "Service temporarily unavailable");
}
