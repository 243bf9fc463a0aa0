//! 路由定义
//!
//! - 健康检查：/health
//! - 事件写入：POST /api/events
//! - 缓冲状态：GET /api/stats

use super::AppState;
use super::handlers::*;
use axum::{
    Router,
    routing::{get, post},
};

/// 创建 API 路由
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/events", post(post_event))
        .route("/api/stats", get(get_stats))
}
