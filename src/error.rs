//! 统一错误模型
//! 定义所有错误类型和错误响应格式

use crate::{auth::AuthError, middleware::current_request_id};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use thiserror::Error;

/// 应用错误类型
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// 已折叠的认证失败（不暴露具体原因）
    #[error("Authentication failed")]
    Unauthorized,

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// 获取 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Auth(kind) => match kind {
                AuthError::MalformedToken
                | AuthError::BadSignature
                | AuthError::ExpiredToken
                | AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
                AuthError::UnknownSubject => StatusCode::NOT_FOUND,
                AuthError::AlreadyExists => StatusCode::CONFLICT,
                AuthError::InsufficientRole => StatusCode::FORBIDDEN,
            },
            AppError::BadRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            // 依赖（凭据存储）响应过慢，不是客户端的问题
            AppError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_) | AppError::Config(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// 获取用户友好的错误消息（不包含敏感信息）
    pub fn user_message(&self) -> String {
        match self {
            AppError::Unauthorized => "Authentication failed".to_string(),
            AppError::Auth(kind) => match kind {
                AuthError::MalformedToken
                | AuthError::BadSignature
                | AuthError::ExpiredToken
                | AuthError::InvalidCredentials => "Authentication failed".to_string(),
                AuthError::UnknownSubject => "Identity not found".to_string(),
                AuthError::AlreadyExists => "Identity already exists".to_string(),
                AuthError::InsufficientRole => "Access denied".to_string(),
            },
            AppError::BadRequest(msg) => msg.clone(),
            AppError::Validation(msg) => msg.clone(),
            AppError::Timeout(_) => "Service temporarily unavailable".to_string(),
            AppError::Database(_) => "Database error occurred".to_string(),
            AppError::Config(_) => "Configuration error".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
        }
    }

    /// 获取错误码
    pub fn code(&self) -> u16 {
        self.status_code().as_u16()
    }

    /// 底层认证失败原因（仅用于日志）
    pub fn auth_kind(&self) -> Option<AuthError> {
        match self {
            AppError::Auth(kind) => Some(*kind),
            _ => None,
        }
    }

    pub fn timeout(msg: &str) -> Self {
        AppError::Timeout(msg.to_string())
    }
}

/// 错误响应 DTO
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: u16,
    pub message: String,
    pub request_id: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // 与 x-request-id 响应头及 http_request span 使用同一个 ID
        let request_id = current_request_id().unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: self.code(),
                message: self.user_message(),
                request_id,
            },
        };

        // 记录错误日志
        if status.is_server_error() {
            tracing::error!(
                code = self.code(),
                message = %self,
                request_id = %error_response.error.request_id,
                "Application error"
            );
        } else {
            tracing::warn!(
                code = self.code(),
                message = %self,
                request_id = %error_response.error.request_id,
                "Request rejected"
            );
        }

        (status, Json(error_response)).into_response()
    }
}

/// 从 config::ConfigError 转换
impl From<config::ConfigError> for AppError {
    fn from(e: config::ConfigError) -> Self {
        AppError::Config(e.to_string())
    }
}

/// 请求体解析失败（格式错误、缺少字段、Content-Type 不对）
impl From<axum::extract::rejection::JsonRejection> for AppError {
    fn from(e: axum::extract::rejection::JsonRejection) -> Self {
        AppError::BadRequest(e.body_text())
    }
}

/// 从 validator::ValidationErrors 转换
impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        AppError::Validation(e.to_string())
    }
}
