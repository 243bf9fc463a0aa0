//! 写入端 Trait 定义
//!
//! - Sink：建立连接
//! - SinkConnection：已建立的连接句柄（schema 初始化、批量写入、管理命令）
//!
//! 设计原则：
//! - 所有接口返回 SinkError
//! - 使用 async_trait 支持动态分发
//! - 连接句柄以 `Arc<dyn SinkConnection>` 形式由连接管理器独占持有

use crate::error::SinkError;
use crate::models::{QueryResult, SinkTarget};
use async_trait::async_trait;
use domain::Batch;
use std::sync::Arc;

/// 时序写入端。
#[async_trait]
pub trait Sink: Send + Sync {
    /// 按目标地址与凭据建立连接
    async fn connect(&self, target: &SinkTarget) -> Result<Arc<dyn SinkConnection>, SinkError>;
}

/// 已建立的写入端连接。
#[async_trait]
pub trait SinkConnection: Send + Sync {
    /// 确保目标数据库存在
    async fn ensure_schema(&self, database: &str) -> Result<(), SinkError> {
        self.run_command(database, &create_database_command(database))
            .await
            .map(|_| ())
    }

    /// 写入一个批次
    async fn write_batch(&self, batch: &Batch) -> Result<(), SinkError>;

    /// 执行原始管理命令
    async fn run_command(
        &self,
        database: &str,
        command: &str,
    ) -> Result<Vec<QueryResult>, SinkError>;
}

/// schema 初始化命令。
pub fn create_database_command(database: &str) -> String {
    format!(
        "CREATE DATABASE \"{}\"",
        database.replace('\\', "\\\\").replace('"', "\\\"")
    )
}
