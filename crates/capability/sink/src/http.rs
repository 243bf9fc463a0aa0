//! InfluxDB 1.x HTTP 写入端
//!
//! - /write：line protocol 批量写入（204 表示成功）
//! - /query：管理命令（CREATE DATABASE 等），返回 JSON 结果集
//!
//! 配置了用户名时使用 HTTP Basic 认证。

use crate::error::SinkError;
use crate::line_protocol::encode_batch;
use crate::models::{QueryResponse, QueryResult, SinkTarget};
use crate::traits::{Sink, SinkConnection};
use async_trait::async_trait;
use domain::Batch;
use std::sync::Arc;

/// 基于 reqwest 的 HTTP 写入端。
#[derive(Debug, Clone, Default)]
pub struct HttpSink {
    client: reqwest::Client,
}

impl HttpSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Sink for HttpSink {
    async fn connect(&self, target: &SinkTarget) -> Result<Arc<dyn SinkConnection>, SinkError> {
        let base = reqwest::Url::parse(&target.address).map_err(|err| {
            SinkError::Transport(format!("invalid address {}: {}", target.address, err))
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(SinkError::Transport(format!(
                "unsupported scheme: {}",
                base.scheme()
            )));
        }
        Ok(Arc::new(HttpConnection {
            client: self.client.clone(),
            base: target.address.trim_end_matches('/').to_string(),
            username: target.username.clone().filter(|value| !value.is_empty()),
            password: target.password.clone(),
        }))
    }
}

/// 已建立的 HTTP 连接。
struct HttpConnection {
    client: reqwest::Client,
    base: String,
    username: Option<String>,
    password: Option<String>,
}

impl HttpConnection {
    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.post(format!("{}/{}", self.base, path));
        match &self.username {
            Some(username) => builder.basic_auth(username, self.password.as_ref()),
            None => builder,
        }
    }
}

#[async_trait]
impl SinkConnection for HttpConnection {
    async fn write_batch(&self, batch: &Batch) -> Result<(), SinkError> {
        let body = encode_batch(batch)?;
        let mut params = vec![
            ("db", batch.database.clone()),
            ("precision", batch.precision.as_str().to_string()),
        ];
        if let Some(rp) = &batch.retention_policy {
            params.push(("rp", rp.clone()));
        }

        let response = self.post("write").query(&params).body(body).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let text = response.text().await.unwrap_or_default();
        Err(SinkError::Status {
            status: status.as_u16(),
            message: error_message(&text),
        })
    }

    async fn run_command(
        &self,
        database: &str,
        command: &str,
    ) -> Result<Vec<QueryResult>, SinkError> {
        let response = self
            .post("query")
            .query(&[("db", database), ("q", command)])
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(SinkError::Status {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        let parsed: QueryResponse = serde_json::from_str(&text)
            .map_err(|err| SinkError::Transport(format!("invalid query response: {}", err)))?;
        if let Some(error) = parsed.error {
            return Err(SinkError::Command(error));
        }
        if let Some(error) = parsed.results.iter().find_map(|result| result.error.clone()) {
            return Err(SinkError::Command(error));
        }
        Ok(parsed.results)
    }
}

/// 服务端错误体通常为 `{"error": "..."}`，否则原样返回。
fn error_message(body: &str) -> String {
    serde_json::from_str::<QueryResponse>(body)
        .ok()
        .and_then(|parsed| parsed.error)
        .unwrap_or_else(|| body.trim().to_string())
}
