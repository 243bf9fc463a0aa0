//! 有界事件队列
//!
//! `VecDeque` 保存待发送事件，公平信号量表示剩余容量：
//! - 入队先取得一个容量许可（许可被 forget，由出队方归还）
//! - `drain` 取出事件并立即归还许可
//! - 守护任务使用 `take` / `commit` / `restore`：发送期间许可保持占用，
//!   失败时事件回到队尾复用原许可，因此回填永远不会阻塞守护任务

use crate::PipelineError;
use domain::Event;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Semaphore;

pub(crate) struct QueueInner {
    pub(crate) events: Mutex<VecDeque<Event>>,
    pub(crate) slots: Semaphore,
    pub(crate) capacity: usize,
    pub(crate) async_overflow: AtomicBool,
    pub(crate) pending_overflow: AtomicUsize,
}

/// 生产者与刷新守护任务之间共享的有界队列。
#[derive(Clone)]
pub struct BoundedQueue {
    pub(crate) inner: Arc<QueueInner>,
}

impl BoundedQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(QueueInner {
                events: Mutex::new(VecDeque::with_capacity(capacity)),
                slots: Semaphore::new(capacity),
                capacity,
                async_overflow: AtomicBool::new(false),
                pending_overflow: AtomicUsize::new(0),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn len(&self) -> usize {
        self.events().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events().is_empty()
    }

    /// 阻塞直到有空位后插入。
    pub async fn enqueue_blocking(&self, event: Event) -> Result<(), PipelineError> {
        let permit = self
            .inner
            .slots
            .acquire()
            .await
            .map_err(|_| PipelineError::QueueClosed)?;
        permit.forget();
        self.push(event);
        Ok(())
    }

    /// 立即取出最多 `max` 个事件并释放其容量。
    pub fn drain(&self, max: usize) -> Vec<Event> {
        let events = self.take(max);
        self.commit(events.len());
        events
    }

    /// 关闭队列：等待中的与后续的入队都返回 `QueueClosed`，已缓冲事件仍可取出。
    pub fn close(&self) {
        self.inner.slots.close();
    }

    pub(crate) fn push(&self, event: Event) {
        self.events().push_back(event);
    }

    /// 取出事件但保留其容量许可。
    pub(crate) fn take(&self, max: usize) -> Vec<Event> {
        let mut events = self.events();
        let count = max.min(events.len());
        let taken: Vec<Event> = events.drain(..count).collect();
        taken
    }

    /// 发送成功后归还许可。
    pub(crate) fn commit(&self, count: usize) {
        if count > 0 {
            self.inner.slots.add_permits(count);
        }
    }

    /// 发送失败后按原顺序追加回队尾，沿用已占用的许可。
    pub(crate) fn restore(&self, failed: Vec<Event>) {
        self.events().extend(failed);
    }

    fn events(&self) -> MutexGuard<'_, VecDeque<Event>> {
        self.inner
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
