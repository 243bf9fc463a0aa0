//! 内存写入端实现
//!
//! 记录所有连接、schema 初始化、批次与管理命令，用于本地测试和演示。
//! 通过 `set_fail_*` 开关模拟写入端故障。

use crate::error::SinkError;
use crate::models::{QueryResult, SinkTarget};
use crate::traits::{Sink, SinkConnection};
use async_trait::async_trait;
use domain::{Batch, Event};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

#[derive(Default)]
struct InMemoryState {
    connects: AtomicUsize,
    targets: RwLock<Vec<SinkTarget>>,
    schema_calls: RwLock<Vec<String>>,
    batches: RwLock<Vec<Batch>>,
    commands: RwLock<Vec<(String, String)>>,
    fail_connect: AtomicBool,
    fail_schema: AtomicBool,
    fail_write: AtomicBool,
}

/// 内存写入端。克隆后共享同一份记录。
#[derive(Clone, Default)]
pub struct InMemorySink {
    state: Arc<InMemoryState>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已建立的连接次数
    pub fn connect_count(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// 最近一次连接使用的目标
    pub fn last_target(&self) -> Option<SinkTarget> {
        self.state
            .targets
            .read()
            .ok()
            .and_then(|targets| targets.last().cloned())
    }

    /// 按顺序记录的 schema 初始化数据库名
    pub fn schema_calls(&self) -> Vec<String> {
        self.state
            .schema_calls
            .read()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// 成功写入的批次
    pub fn batches(&self) -> Vec<Batch> {
        self.state
            .batches
            .read()
            .map(|batches| batches.clone())
            .unwrap_or_default()
    }

    /// 所有成功写入批次中的事件（按写入顺序展开）
    pub fn received_events(&self) -> Vec<Event> {
        self.batches()
            .into_iter()
            .flat_map(Batch::into_events)
            .collect()
    }

    /// 执行过的 (database, command)
    pub fn commands(&self) -> Vec<(String, String)> {
        self.state
            .commands
            .read()
            .map(|commands| commands.clone())
            .unwrap_or_default()
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.state.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_schema(&self, fail: bool) {
        self.state.fail_schema.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_write(&self, fail: bool) {
        self.state.fail_write.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Sink for InMemorySink {
    async fn connect(&self, target: &SinkTarget) -> Result<Arc<dyn SinkConnection>, SinkError> {
        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(SinkError::Transport("connection refused".to_string()));
        }
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        let mut targets = self
            .state
            .targets
            .write()
            .map_err(|_| SinkError::rejected("lock failed"))?;
        targets.push(target.clone());
        Ok(Arc::new(InMemoryConnection {
            state: self.state.clone(),
        }))
    }
}

struct InMemoryConnection {
    state: Arc<InMemoryState>,
}

#[async_trait]
impl SinkConnection for InMemoryConnection {
    async fn ensure_schema(&self, database: &str) -> Result<(), SinkError> {
        let mut calls = self
            .state
            .schema_calls
            .write()
            .map_err(|_| SinkError::rejected("lock failed"))?;
        calls.push(database.to_string());
        if self.state.fail_schema.load(Ordering::SeqCst) {
            return Err(SinkError::Command(format!(
                "cannot create database {}",
                database
            )));
        }
        Ok(())
    }

    async fn write_batch(&self, batch: &Batch) -> Result<(), SinkError> {
        if self.state.fail_write.load(Ordering::SeqCst) {
            return Err(SinkError::Status {
                status: 503,
                message: "sink unavailable".to_string(),
            });
        }
        let mut batches = self
            .state
            .batches
            .write()
            .map_err(|_| SinkError::rejected("lock failed"))?;
        batches.push(batch.clone());
        Ok(())
    }

    async fn run_command(
        &self,
        database: &str,
        command: &str,
    ) -> Result<Vec<QueryResult>, SinkError> {
        let mut commands = self
            .state
            .commands
            .write()
            .map_err(|_| SinkError::rejected("lock failed"))?;
        commands.push((database.to_string(), command.to_string()));
        Ok(vec![QueryResult::default()])
    }
}
