//! 缓冲状态与计数快照。
//!
//! - GET /api/stats

use api_contract::{ApiResponse, StatsDto};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use fluxlog_engine::Backpressure;
use fluxlog_telemetry::metrics;

use crate::AppState;

pub async fn get_stats(State(state): State<AppState>) -> Response {
    let engine = &state.engine;
    let snapshot = metrics().snapshot();
    let backpressure = match engine.backpressure() {
        Backpressure::Block => "block",
        Backpressure::AsyncOverflow => "async_overflow",
    };
    (
        StatusCode::OK,
        Json(ApiResponse::success(StatsDto {
            queue_len: engine.queue_len(),
            queue_capacity: engine.queue_capacity(),
            pending_overflow: engine.pending_overflow(),
            backpressure: backpressure.to_string(),
            database: engine.write_settings().database,
            connected: engine.is_connected().await,
            events_enqueued: snapshot.events_enqueued,
            events_rejected: snapshot.events_rejected,
            events_flushed: snapshot.events_flushed,
            events_requeued: snapshot.events_requeued,
            batches_flushed: snapshot.batches_flushed,
            connect_failures: snapshot.connect_failures,
            write_failures: snapshot.write_failures,
        })),
    )
        .into_response()
}
