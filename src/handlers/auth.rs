//! 认证相关的 HTTP 处理器

use crate::{
    auth::middleware::Principal,
    error::AppError,
    middleware::AppState,
    models::{auth::*, user::IdentityResponse},
};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

/// 注册
pub async fn register(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = payload?;
    let (identity, token) = state
        .auth_service
        .register(req, state.clock.now())
        .await?;

    let response = RegisterResponse {
        id: identity.id,
        name: identity.name,
        email: identity.email,
        roles: identity.roles,
        token,
    };

    Ok((StatusCode::CREATED, Json(response)))
}

/// 登录
pub async fn login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = payload?;
    let id = req.id.clone();
    let token = state.auth_service.login(req, state.clock.now()).await?;

    Ok(Json(LoginResponse { id, token }))
}

/// 获取当前用户信息
pub async fn me(principal: Principal) -> Json<IdentityResponse> {
    Json(IdentityResponse {
        id: principal.id,
        name: principal.name,
        email: principal.email,
        roles: principal.roles,
    })
}
