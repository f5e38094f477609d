//! HTTP 处理器模块

pub mod auth;
pub mod health;
pub mod resource;
