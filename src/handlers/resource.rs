//! 受角色保护的示例资源
//!
//! Access is decided entirely by the route policy before these run.

use crate::auth::middleware::Principal;
use axum::Json;
use serde_json::{json, Value};

pub async fn user_resource(principal: Principal) -> Json<Value> {
    Json(json!({ "message": format!("Welcome, {}! User content.", principal.name) }))
}

pub async fn moderator_resource(principal: Principal) -> Json<Value> {
    Json(json!({ "message": format!("Welcome, {}! Moderator content.", principal.name) }))
}

pub async fn admin_resource(principal: Principal) -> Json<Value> {
    Json(json!({ "message": format!("Welcome, {}! Admin content.", principal.name) }))
}
