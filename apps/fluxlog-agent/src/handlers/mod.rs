//! Handlers 模块

pub mod events;
pub mod stats;

pub use events::*;
pub use stats::*;

use axum::{Json, response::IntoResponse};

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}
