//! Fluxlog agent：HTTP 事件入口 + 缓冲批量写入 InfluxDB。

mod handlers;
mod middleware;
mod routes;
mod utils;

use axum::Router;
use domain::Tags;
use fluxlog_config::FluxlogConfig;
use fluxlog_engine::Fluxlog;
use fluxlog_sink::HttpSink;
use fluxlog_telemetry::init_tracing;
use middleware::{RequestTiming, record_request};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// 请求计时事件的 measurement。
const REQUEST_MEASUREMENT: &str = "http_request";

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Fluxlog>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    // 从环境变量加载运行配置
    let config = FluxlogConfig::from_env()?;
    // 初始化结构化日志
    init_tracing();

    if config.address.is_none() {
        warn!(target: "fluxlog.agent", "FLUXLOG_ADDRESS not set, events stay buffered");
    }
    let engine = Arc::new(Fluxlog::new(Arc::new(HttpSink::new()), &config));
    let daemon = engine.start();

    let app = build_app(AppState {
        engine: engine.clone(),
    });
    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    info!(target: "fluxlog.agent", addr = %config.http_addr, "agent_listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 停止接收后做最后一次刷新
    engine.close();
    daemon.shutdown().await?;
    info!(target: "fluxlog.agent", remaining = engine.queue_len(), "agent_stopped");
    Ok(())
}

fn build_app(state: AppState) -> Router {
    let tags = Tags::from([("source".to_string(), "fluxlog-agent".to_string())]);
    let timing = RequestTiming::new(state.engine.clone(), REQUEST_MEASUREMENT).with_tags(tags);
    routes::create_api_router()
        .with_state(state)
        .layer(axum::middleware::from_fn_with_state(timing, record_request))
        .layer(TraceLayer::new_for_http())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(target: "fluxlog.agent", error = %err, "ctrl_c_listener_failed");
        std::future::pending::<()>().await;
    }
    info!(target: "fluxlog.agent", "shutdown_requested");
}

#[cfg(test)]
mod tests {
    use super::{AppState, build_app};
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use domain::FieldValue;
    use fluxlog_config::FluxlogConfig;
    use fluxlog_engine::Fluxlog;
    use fluxlog_sink::InMemorySink;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn state(sink: &InMemorySink) -> AppState {
        let config = FluxlogConfig {
            address: Some("memory://local".to_string()),
            ..FluxlogConfig::default()
        };
        AppState {
            engine: Arc::new(Fluxlog::new(Arc::new(sink.clone()), &config)),
        }
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("json")
    }

    #[tokio::test]
    async fn post_event_is_queued() {
        let sink = InMemorySink::new();
        let state = state(&sink);
        let engine = state.engine.clone();
        let app = build_app(state);

        let request = Request::post("/api/events")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                r#"{"measurement":"cpu","fields":{"load":0.5},"tags":{"host":"a"}}"#,
            ))
            .expect("request");
        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = body_json(response).await;
        assert_eq!(body["data"]["outcome"], "queued");

        engine.flush_now().await;
        let events = sink.received_events();
        let cpu = events
            .iter()
            .find(|event| event.measurement == "cpu")
            .expect("cpu event");
        assert_eq!(cpu.fields.get("load"), Some(&FieldValue::F64(0.5)));
    }

    #[tokio::test]
    async fn invalid_event_is_bad_request() {
        let sink = InMemorySink::new();
        let app = build_app(state(&sink));

        let request = Request::post("/api/events")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"measurement":"cpu","fields":{}}"#))
            .expect("request");
        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "EVENT.INVALID");
    }

    #[tokio::test]
    async fn every_request_is_timed() {
        let sink = InMemorySink::new();
        let state = state(&sink);
        let engine = state.engine.clone();
        let app = build_app(state);

        let request = Request::get("/health?probe=1")
            .header(header::HOST, "agent.local")
            .body(Body::empty())
            .expect("request");
        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        engine.flush_now().await;
        let events = sink.received_events();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.measurement, "http_request");
        assert_eq!(event.fields.get("status"), Some(&FieldValue::I64(200)));
        assert!(event.fields.contains_key("milliseconds"));
        assert_eq!(event.tags.get("method").map(String::as_str), Some("GET"));
        assert_eq!(
            event.tags.get("uri").map(String::as_str),
            Some("/health?probe=1")
        );
        assert_eq!(
            event.tags.get("host").map(String::as_str),
            Some("agent.local")
        );
        assert_eq!(
            event.tags.get("source").map(String::as_str),
            Some("fluxlog-agent")
        );
    }

    #[tokio::test]
    async fn stats_report_queue_state() {
        let sink = InMemorySink::new();
        let app = build_app(state(&sink));

        let request = Request::get("/api/stats")
            .body(Body::empty())
            .expect("request");
        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["queueCapacity"], 1000);
        assert_eq!(body["data"]["backpressure"], "block");
        assert_eq!(body["data"]["database"], "fluxlog");
    }
}
