//! 事件写入接口。
//!
//! - POST /api/events

use api_contract::{ApiResponse, EventAccepted, EventRequest};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use domain::{FieldValue, Fields};
use fluxlog_engine::EnqueueOutcome;
use serde_json::{Map, Value};

use crate::AppState;
use crate::utils::response::{bad_request_error, pipeline_error};

pub async fn post_event(State(state): State<AppState>, Json(req): Json<EventRequest>) -> Response {
    let fields = match json_fields(req.fields) {
        Ok(fields) => fields,
        Err(message) => return bad_request_error(message),
    };

    match state.engine.write(&req.measurement, fields, req.tags).await {
        Ok(outcome) => {
            let outcome = match outcome {
                EnqueueOutcome::Queued => "queued",
                EnqueueOutcome::Deferred => "deferred",
            };
            (
                StatusCode::ACCEPTED,
                Json(ApiResponse::success(EventAccepted {
                    outcome: outcome.to_string(),
                })),
            )
                .into_response()
        }
        Err(err) => pipeline_error(err),
    }
}

/// JSON 标量转字段值：整数 → I64，其它数字 → F64。
fn json_fields(raw: Map<String, Value>) -> Result<Fields, String> {
    let mut fields = Fields::new();
    for (key, value) in raw {
        let value = match value {
            Value::Bool(value) => FieldValue::Bool(value),
            Value::String(value) => FieldValue::String(value),
            Value::Number(number) => match number.as_i64() {
                Some(value) => FieldValue::I64(value),
                None => FieldValue::F64(number.as_f64().unwrap_or(f64::NAN)),
            },
            _ => return Err(format!("field {key} must be a number, bool or string")),
        };
        fields.insert(key, value);
    }
    Ok(fields)
}
