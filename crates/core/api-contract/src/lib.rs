//! 稳定的 DTO 与 API 响应契约。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// 标准 API 响应封装。
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

/// 失败响应的错误体。
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

/// 事件写入请求体。字段值只接受数字、布尔与字符串。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRequest {
    pub measurement: String,
    pub fields: Map<String, Value>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// 事件写入结果。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventAccepted {
    /// queued | deferred
    pub outcome: String,
}

/// 缓冲状态与累计计数。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsDto {
    pub queue_len: usize,
    pub queue_capacity: usize,
    pub pending_overflow: usize,
    pub backpressure: String,
    pub database: String,
    pub connected: bool,
    pub events_enqueued: u64,
    pub events_rejected: u64,
    pub events_flushed: u64,
    pub events_requeued: u64,
    pub batches_flushed: u64,
    pub connect_failures: u64,
    pub write_failures: u64,
}
