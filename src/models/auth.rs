//! Authentication-related models

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Registration request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 128, message = "id must be 1-128 characters"))]
    pub id: String,
    #[validate(length(min = 1, max = 256, message = "name must not be empty"))]
    pub name: String,
    #[validate(email(message = "email is not valid"))]
    pub email: String,
    pub password: String,
    #[validate(length(min = 1, message = "at least one role is required"))]
    pub roles: Vec<String>,
}

/// Registration response (password never echoed)
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub roles: Vec<String>,
    pub token: String,
}

/// Login request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "id must not be empty"))]
    pub id: String,
    pub password: String,
}

/// Login response
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub id: String,
    pub token: String,
}
