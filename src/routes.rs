//! 路由配置
//!
//! Middleware order, outermost first: request tracking, HTTP trace, body
//! limit, authentication, authorization.

use crate::{
    auth::middleware::{authenticate, authorize},
    handlers::{auth, health, resource},
    middleware::{request_tracking_middleware, AppState},
};
use axum::{
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// 请求体大小上限
const MAX_BODY_BYTES: usize = 64 * 1024;

/// 创建应用路由
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // 健康检查
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // 认证
        .route("/v1/auth/register", post(auth::register))
        .route("/v1/auth/login", post(auth::login))
        .route("/v1/me", get(auth::me))
        // 受角色保护的资源
        .route("/v1/resources/user", get(resource::user_resource))
        .route("/v1/resources/moderator", get(resource::moderator_resource))
        .route("/v1/resources/admin", get(resource::admin_resource))
        // 后添加的 layer 先执行：authenticate 在 authorize 之前
        .layer(from_fn_with_state(state.clone(), authorize))
        .layer(from_fn_with_state(state.clone(), authenticate))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(request_tracking_middleware))
        .with_state(state)
}
