//! 批量刷新守护任务
//!
//! 每个刷新周期（Idle → Flushing）：
//! 1. 读取队列长度 n，为 0 直接返回
//! 2. 确保连接可用；失败则记录（节流）并返回，事件保留在队列中
//! 3. 取出最多 n 个事件组成批次（使用当前数据库/精度/保留策略）
//! 4. 通过连接管理器发送
//! 5. 失败：事件按原顺序追加回队尾，记录失败（节流）
//! 6. 成功：丢弃批次；若此前处于失败状态，输出一次恢复日志
//!
//! 刷新间隔与失败日志间隔可在运行期修改，下个周期生效。

use crate::PipelineError;
use crate::connection::ConnectionManager;
use crate::queue::BoundedQueue;
use crate::throttle::ErrorLogThrottle;
use domain::Batch;
use fluxlog_telemetry::{
    record_batch_flushed, record_connect_failure, record_events_requeued,
    record_flush_latency_ms, record_write_failure,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info};

/// 运行期可调的刷新参数。
#[derive(Debug)]
pub struct FlushSettings {
    flush_interval_ms: AtomicU64,
    error_log_interval_ms: AtomicU64,
}

impl FlushSettings {
    pub fn new(flush_interval: Duration, error_log_interval: Duration) -> Self {
        Self {
            flush_interval_ms: AtomicU64::new(duration_ms(flush_interval)),
            error_log_interval_ms: AtomicU64::new(millis(error_log_interval)),
        }
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.load(Ordering::Relaxed))
    }

    pub fn set_flush_interval(&self, interval: Duration) {
        self.flush_interval_ms
            .store(duration_ms(interval), Ordering::Relaxed);
    }

    pub fn error_log_interval(&self) -> Duration {
        Duration::from_millis(self.error_log_interval_ms.load(Ordering::Relaxed))
    }

    pub fn set_error_log_interval(&self, interval: Duration) {
        self.error_log_interval_ms
            .store(millis(interval), Ordering::Relaxed);
    }
}

impl Default for FlushSettings {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(3600))
    }
}

/// 刷新间隔至少 1ms，避免忙循环。
fn duration_ms(interval: Duration) -> u64 {
    millis(interval).max(1)
}

/// 毫秒数，超出 u64 时饱和。
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// 单个刷新周期的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// 队列为空，未做任何工作
    Idle,
    /// 批次发送成功
    Flushed { events: usize, recovered: bool },
    /// 无法建立连接，事件保留在队列中
    ConnectFailed { logged: bool },
    /// 发送失败，事件已回到队尾
    WriteFailed { requeued: usize, logged: bool },
}

/// 批量刷新守护任务。
pub struct FlushDaemon {
    queue: BoundedQueue,
    connection: Arc<ConnectionManager>,
    settings: Arc<FlushSettings>,
    throttle: Mutex<ErrorLogThrottle>,
}

impl FlushDaemon {
    pub fn new(
        queue: BoundedQueue,
        connection: Arc<ConnectionManager>,
        settings: Arc<FlushSettings>,
    ) -> Self {
        Self {
            queue,
            connection,
            settings,
            throttle: Mutex::new(ErrorLogThrottle::new()),
        }
    }

    pub fn settings(&self) -> &Arc<FlushSettings> {
        &self.settings
    }

    /// 执行一个刷新周期。并发调用会被串行化。
    pub async fn tick(&self) -> TickOutcome {
        let mut throttle = self.throttle.lock().await;
        let pending = self.queue.len();
        if pending == 0 {
            return TickOutcome::Idle;
        }

        if let Err(err) = self.connection.ensure_connected().await {
            record_connect_failure();
            let logged = self.report_failure(&mut throttle, pending, &err);
            return TickOutcome::ConnectFailed { logged };
        }

        let settings = self.connection.write_settings();
        let batch = Batch::new(
            settings.database,
            settings.precision,
            settings.retention_policy,
            self.queue.take(pending),
        );
        if batch.is_empty() {
            return TickOutcome::Idle;
        }
        let count = batch.len();

        let started_at = Instant::now();
        match self.connection.write_batch(&batch).await {
            Ok(()) => {
                self.queue.commit(count);
                record_batch_flushed(count);
                record_flush_latency_ms(millis(started_at.elapsed()));
                let recovered = throttle.on_success();
                if recovered {
                    info!(target: "fluxlog.daemon", events = count, "flush_recovered");
                }
                debug!(
                    target: "fluxlog.daemon",
                    events = count,
                    database = %batch.database,
                    "batch_flushed"
                );
                TickOutcome::Flushed {
                    events: count,
                    recovered,
                }
            }
            Err(err) => {
                record_write_failure();
                self.queue.restore(batch.into_events());
                record_events_requeued(count);
                let logged = self.report_failure(&mut throttle, self.queue.len(), &err);
                TickOutcome::WriteFailed {
                    requeued: count,
                    logged,
                }
            }
        }
    }

    fn report_failure(
        &self,
        throttle: &mut ErrorLogThrottle,
        pending: usize,
        err: &PipelineError,
    ) -> bool {
        let logged = throttle.on_failure(Instant::now(), self.settings.error_log_interval());
        if logged {
            error!(
                target: "fluxlog.daemon",
                pending = pending,
                error = %err,
                "flush_failed"
            );
        }
        logged
    }

    async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            target: "fluxlog.daemon",
            interval_ms = millis(self.settings.flush_interval()),
            "flush_daemon_started"
        );
        loop {
            let interval = self.settings.flush_interval();
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => break,
            }
            self.tick().await;
        }
        let outcome = self.tick().await;
        info!(
            target: "fluxlog.daemon",
            outcome = ?outcome,
            remaining = self.queue.len(),
            "flush_daemon_stopped"
        );
    }
}

/// 启动刷新守护任务。
pub fn start(daemon: Arc<FlushDaemon>) -> DaemonHandle {
    let (shutdown, receiver) = watch::channel(false);
    let join = tokio::spawn(daemon.run(receiver));
    DaemonHandle { shutdown, join }
}

/// 守护任务控制句柄。句柄被丢弃时守护任务在下个周期前退出。
pub struct DaemonHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl DaemonHandle {
    /// 停止循环；退出前会再执行一次刷新。
    pub async fn shutdown(self) -> Result<(), PipelineError> {
        let _ = self.shutdown.send(true);
        self.join
            .await
            .map_err(|err| PipelineError::Daemon(err.to_string()))
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}
