//! 请求计时中间件
//!
//! 每个请求结束后写入一条事件：
//! - fields：milliseconds（耗时）、status（响应码）
//! - tags：method、uri、host，再叠加中间件级别的 tag（同名时中间件 tag 优先）

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use domain::{FieldValue, Fields, Tags};
use fluxlog_engine::Fluxlog;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::warn;

/// 计时中间件状态。
#[derive(Clone)]
pub struct RequestTiming {
    engine: Arc<Fluxlog>,
    measurement: String,
    tags: Tags,
}

impl RequestTiming {
    pub fn new(engine: Arc<Fluxlog>, measurement: impl Into<String>) -> Self {
        Self {
            engine,
            measurement: measurement.into(),
            tags: Tags::new(),
        }
    }

    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }
}

pub async fn record_request(
    State(timing): State<RequestTiming>,
    req: Request,
    next: Next,
) -> Response {
    let started_at = Instant::now();
    let method = req.method().to_string();
    let uri = req
        .uri()
        .path_and_query()
        .map(|value| value.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .or_else(|| req.uri().host().map(str::to_string))
        .unwrap_or_default();

    let response = next.run(req).await;

    let mut fields = Fields::new();
    fields.insert(
        "milliseconds".to_string(),
        FieldValue::I64(i64::try_from(started_at.elapsed().as_millis()).unwrap_or(i64::MAX)),
    );
    fields.insert(
        "status".to_string(),
        FieldValue::I64(i64::from(response.status().as_u16())),
    );
    let mut tags = Tags::new();
    tags.insert("method".to_string(), method);
    tags.insert("uri".to_string(), uri);
    tags.insert("host".to_string(), host);
    tags.extend(timing.tags.clone());

    if let Err(err) = timing
        .engine
        .write(&timing.measurement, fields, tags)
        .await
    {
        warn!(target: "fluxlog.agent", error = %err, "request_event_dropped");
    }
    response
}
