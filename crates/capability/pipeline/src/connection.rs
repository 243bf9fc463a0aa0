//! 连接管理
//!
//! 独占持有写入端连接句柄，状态只有两种：无句柄 / 已连接且 schema 已初始化。
//!
//! - `ensure_connected`：已有句柄时直接返回；否则建立连接并立即执行 schema 初始化，
//!   初始化失败时丢弃新句柄（不存在"已连接但无 schema"的状态）
//! - 写入端返回的任何错误都会使句柄失效，下次使用时重新连接并初始化
//! - 所有状态迁移在同一把异步锁内完成，生产者触发的管理命令与守护任务互斥

use crate::PipelineError;
use domain::{Batch, Precision};
use fluxlog_sink::{QueryResult, Sink, SinkConnection, SinkTarget};
use fluxlog_telemetry::record_connect;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// 批次写入参数（数据库、时间精度、保留策略）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSettings {
    pub database: String,
    pub precision: Precision,
    pub retention_policy: Option<String>,
}

impl Default for WriteSettings {
    fn default() -> Self {
        Self {
            database: "fluxlog".to_string(),
            precision: Precision::default(),
            retention_policy: None,
        }
    }
}

type Handle = Option<Arc<dyn SinkConnection>>;

/// 写入端连接管理器。
pub struct ConnectionManager {
    sink: Arc<dyn Sink>,
    target: RwLock<SinkTarget>,
    settings: RwLock<WriteSettings>,
    handle: Mutex<Handle>,
}

impl ConnectionManager {
    pub fn new(sink: Arc<dyn Sink>, target: SinkTarget, settings: WriteSettings) -> Self {
        Self {
            sink,
            target: RwLock::new(target),
            settings: RwLock::new(settings),
            handle: Mutex::new(None),
        }
    }

    /// 地址在下次建立连接时生效。
    pub fn set_address(&self, address: impl Into<String>) {
        self.update_target(|target| target.address = address.into());
    }

    pub fn set_username(&self, username: Option<String>) {
        self.update_target(|target| target.username = username);
    }

    pub fn set_password(&self, password: Option<String>) {
        self.update_target(|target| target.password = password);
    }

    pub fn target(&self) -> SinkTarget {
        self.target
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn write_settings(&self) -> WriteSettings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_precision(&self, precision: Precision) {
        self.update_settings(|settings| settings.precision = precision);
    }

    pub fn set_retention_policy(&self, retention_policy: Option<String>) {
        self.update_settings(|settings| {
            settings.retention_policy = retention_policy.filter(|rp| !rp.is_empty())
        });
    }

    /// 切换目标数据库；已连接时对新库执行一次 schema 初始化，不重建传输层。
    pub async fn change_database(&self, name: &str) -> Result<(), PipelineError> {
        if name.is_empty() {
            return Err(PipelineError::Configuration(
                "database name must not be empty".to_string(),
            ));
        }
        let mut handle = self.handle.lock().await;
        self.update_settings(|settings| settings.database = name.to_string());
        let Some(conn) = handle.clone() else {
            return Ok(());
        };
        if let Err(err) = conn.ensure_schema(name).await {
            warn!(
                target: "fluxlog.connection",
                database = %name,
                error = %err,
                "schema_bootstrap_failed"
            );
            *handle = None;
            return Err(PipelineError::Schema(err));
        }
        info!(target: "fluxlog.connection", database = %name, "database_changed");
        Ok(())
    }

    pub async fn is_connected(&self) -> bool {
        self.handle.lock().await.is_some()
    }

    /// 确保存在可用连接。
    pub async fn ensure_connected(&self) -> Result<(), PipelineError> {
        let mut handle = self.handle.lock().await;
        self.connect_locked(&mut handle).await.map(|_| ())
    }

    /// 无条件丢弃连接句柄。
    pub async fn disconnect(&self) {
        let mut handle = self.handle.lock().await;
        if handle.take().is_some() {
            info!(target: "fluxlog.connection", "disconnected");
        }
    }

    /// 写入一个批次；失败时句柄失效。
    pub async fn write_batch(&self, batch: &Batch) -> Result<(), PipelineError> {
        let mut handle = self.handle.lock().await;
        let conn = self.connect_locked(&mut handle).await?;
        match conn.write_batch(batch).await {
            Ok(()) => Ok(()),
            Err(err) => {
                *handle = None;
                Err(PipelineError::Write(err))
            }
        }
    }

    /// 对当前数据库执行原始管理命令；失败时句柄失效。
    pub async fn run_command(&self, command: &str) -> Result<Vec<QueryResult>, PipelineError> {
        let mut handle = self.handle.lock().await;
        let conn = self.connect_locked(&mut handle).await?;
        let database = self.write_settings().database;
        match conn.run_command(&database, command).await {
            Ok(results) => Ok(results),
            Err(err) => {
                *handle = None;
                Err(PipelineError::Command(err))
            }
        }
    }

    async fn connect_locked(
        &self,
        handle: &mut Handle,
    ) -> Result<Arc<dyn SinkConnection>, PipelineError> {
        if let Some(conn) = handle.as_ref() {
            return Ok(conn.clone());
        }
        let target = self.target();
        if target.address.is_empty() {
            return Err(PipelineError::Configuration(
                "no sink address provided for connection".to_string(),
            ));
        }
        let conn = self
            .sink
            .connect(&target)
            .await
            .map_err(PipelineError::Connection)?;
        let database = self.write_settings().database;
        conn.ensure_schema(&database)
            .await
            .map_err(PipelineError::Schema)?;

        record_connect();
        info!(
            target: "fluxlog.connection",
            address = %target.address,
            database = %database,
            "connected"
        );
        *handle = Some(conn.clone());
        Ok(conn)
    }

    fn update_target(&self, apply: impl FnOnce(&mut SinkTarget)) {
        let mut target = self.target.write().unwrap_or_else(PoisonError::into_inner);
        apply(&mut target);
    }

    fn update_settings(&self, apply: impl FnOnce(&mut WriteSettings)) {
        let mut settings = self.settings.write().unwrap_or_else(PoisonError::into_inner);
        apply(&mut settings);
    }
}
