//! HTTP 响应辅助函数
//!
//! 所有错误返回统一的 ApiResponse 格式，HTTP 状态码与错误码对应。

use api_contract::ApiResponse;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use fluxlog_engine::PipelineError;

/// 错误请求响应
pub fn bad_request_error(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiResponse::<()>::error("EVENT.INVALID", message.into())),
    )
        .into_response()
}

/// 引擎错误响应
pub fn pipeline_error(err: PipelineError) -> Response {
    let (status, code) = match &err {
        PipelineError::Validation(_) => (StatusCode::BAD_REQUEST, "EVENT.INVALID"),
        PipelineError::QueueClosed => (StatusCode::SERVICE_UNAVAILABLE, "QUEUE.CLOSED"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL.ERROR"),
    };
    (
        status,
        Json(ApiResponse::<()>::error(code, err.to_string())),
    )
        .into_response()
}
