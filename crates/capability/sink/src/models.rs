//! 写入端数据模型
//!
//! - SinkTarget：连接目标（地址 + 凭据）
//! - QueryResult / Series：管理命令返回的结果集（与 InfluxDB /query 响应结构一致）

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 连接目标。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkTarget {
    pub address: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl SinkTarget {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            username: None,
            password: None,
        }
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }
}

/// 单条语句的执行结果。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    #[serde(default)]
    pub statement_id: u32,
    #[serde(default)]
    pub series: Vec<Series>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 结果序列。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Series {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub values: Vec<Vec<serde_json::Value>>,
}

/// /query 接口的响应体。
#[derive(Debug, Default, Deserialize)]
pub(crate) struct QueryResponse {
    #[serde(default)]
    pub results: Vec<QueryResult>,
    #[serde(default)]
    pub error: Option<String>,
}
