//! 事件缓冲与批量发送。
//!
//! 数据流：生产者 → 背压策略 → 有界队列 → 刷新守护任务 → 连接管理器 → 写入端。
//! 生产者只可能在队列容量上等待，不会等待网络 I/O；
//! 连接/写入错误全部在守护任务内部处理，不会传播给生产者。
//!
//! 已知限制：写入端调用没有内部超时，挂起的写入会阻塞当前刷新周期。

pub mod backpressure;
pub mod connection;
pub mod daemon;
pub mod queue;
pub mod throttle;

pub use backpressure::{Backpressure, EnqueueOutcome};
pub use connection::{ConnectionManager, WriteSettings};
pub use daemon::{DaemonHandle, FlushDaemon, FlushSettings, TickOutcome, start};
pub use queue::BoundedQueue;
pub use throttle::ErrorLogThrottle;

use domain::EventError;
use fluxlog_sink::SinkError;

/// Pipeline 处理错误。
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("connection error: {0}")]
    Connection(SinkError),
    #[error("schema error: {0}")]
    Schema(SinkError),
    #[error("write error: {0}")]
    Write(SinkError),
    #[error("command error: {0}")]
    Command(SinkError),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("queue closed")]
    QueueClosed,
    #[error("flush daemon failed: {0}")]
    Daemon(String),
}

impl From<EventError> for PipelineError {
    fn from(err: EventError) -> Self {
        Self::Validation(err.to_string())
    }
}
