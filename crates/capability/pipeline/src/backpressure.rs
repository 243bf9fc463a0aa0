//! 背压策略
//!
//! - `Block`（默认）：队列满时调用方等待空位，队列长度永不超过容量；
//!   写入端长时间故障时阻塞会传导到所有生产者
//! - `AsyncOverflow`：有空位时立即插入；队列满时把插入交给独立的后台任务执行，
//!   调用方立即返回。持续过载下后台插入任务的数量没有上限（内存随之增长），
//!   可通过 [`BoundedQueue::pending_overflow`] 观察

use crate::PipelineError;
use crate::queue::BoundedQueue;
use domain::Event;
use fluxlog_telemetry::record_overflow_spawned;
use std::sync::atomic::Ordering;
use tokio::sync::TryAcquireError;
use tracing::warn;

/// 队列满时的处理方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backpressure {
    #[default]
    Block,
    AsyncOverflow,
}

/// 单次入队结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// 已进入队列
    Queued,
    /// 队列已满，插入交给后台任务
    Deferred,
}

impl BoundedQueue {
    pub fn backpressure(&self) -> Backpressure {
        if self.inner.async_overflow.load(Ordering::Acquire) {
            Backpressure::AsyncOverflow
        } else {
            Backpressure::Block
        }
    }

    pub fn set_backpressure(&self, mode: Backpressure) {
        self.inner
            .async_overflow
            .store(mode == Backpressure::AsyncOverflow, Ordering::Release);
    }

    /// 尚未完成的后台插入数量。
    pub fn pending_overflow(&self) -> usize {
        self.inner.pending_overflow.load(Ordering::Acquire)
    }

    /// 按当前背压策略入队。
    pub async fn enqueue(&self, event: Event) -> Result<EnqueueOutcome, PipelineError> {
        match self.inner.slots.try_acquire() {
            Ok(permit) => {
                permit.forget();
                self.push(event);
                Ok(EnqueueOutcome::Queued)
            }
            Err(TryAcquireError::Closed) => Err(PipelineError::QueueClosed),
            Err(TryAcquireError::NoPermits) => match self.backpressure() {
                Backpressure::Block => {
                    self.enqueue_blocking(event).await?;
                    Ok(EnqueueOutcome::Queued)
                }
                Backpressure::AsyncOverflow => {
                    self.spawn_overflow_insert(event);
                    Ok(EnqueueOutcome::Deferred)
                }
            },
        }
    }

    fn spawn_overflow_insert(&self, event: Event) {
        self.inner.pending_overflow.fetch_add(1, Ordering::AcqRel);
        record_overflow_spawned();
        let queue = self.clone();
        tokio::spawn(async move {
            if let Err(err) = queue.enqueue_blocking(event).await {
                warn!(target: "fluxlog.queue", error = %err, "overflow_insert_dropped");
            }
            queue.inner.pending_overflow.fetch_sub(1, Ordering::AcqRel);
        });
    }
}
