//! 日志初始化与缓冲/发送计数指标。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 指标快照。
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub events_enqueued: u64,
    pub events_rejected: u64,
    pub overflow_spawned: u64,
    pub batches_flushed: u64,
    pub events_flushed: u64,
    pub events_requeued: u64,
    pub connect_failures: u64,
    pub write_failures: u64,
    pub connects: u64,
    pub flush_latency_ms_total: u64,
    pub flush_latency_ms_count: u64,
}

/// 进程级计数指标。
pub struct TelemetryMetrics {
    events_enqueued: AtomicU64,
    events_rejected: AtomicU64,
    overflow_spawned: AtomicU64,
    batches_flushed: AtomicU64,
    events_flushed: AtomicU64,
    events_requeued: AtomicU64,
    connect_failures: AtomicU64,
    write_failures: AtomicU64,
    connects: AtomicU64,
    flush_latency_ms_total: AtomicU64,
    flush_latency_ms_count: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            events_enqueued: AtomicU64::new(0),
            events_rejected: AtomicU64::new(0),
            overflow_spawned: AtomicU64::new(0),
            batches_flushed: AtomicU64::new(0),
            events_flushed: AtomicU64::new(0),
            events_requeued: AtomicU64::new(0),
            connect_failures: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            connects: AtomicU64::new(0),
            flush_latency_ms_total: AtomicU64::new(0),
            flush_latency_ms_count: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_enqueued: self.events_enqueued.load(Ordering::Relaxed),
            events_rejected: self.events_rejected.load(Ordering::Relaxed),
            overflow_spawned: self.overflow_spawned.load(Ordering::Relaxed),
            batches_flushed: self.batches_flushed.load(Ordering::Relaxed),
            events_flushed: self.events_flushed.load(Ordering::Relaxed),
            events_requeued: self.events_requeued.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            connects: self.connects.load(Ordering::Relaxed),
            flush_latency_ms_total: self.flush_latency_ms_total.load(Ordering::Relaxed),
            flush_latency_ms_count: self.flush_latency_ms_count.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 记录事件入队次数。
pub fn record_event_enqueued() {
    metrics().events_enqueued.fetch_add(1, Ordering::Relaxed);
}

/// 记录事件在入口被拒绝的次数（校验失败、白名单）。
pub fn record_event_rejected() {
    metrics().events_rejected.fetch_add(1, Ordering::Relaxed);
}

/// 记录队列满时转入后台插入的次数。
pub fn record_overflow_spawned() {
    metrics().overflow_spawned.fetch_add(1, Ordering::Relaxed);
}

/// 记录一次成功发送的批次及其事件数。
pub fn record_batch_flushed(events: usize) {
    let metrics = metrics();
    metrics.batches_flushed.fetch_add(1, Ordering::Relaxed);
    metrics
        .events_flushed
        .fetch_add(u64::try_from(events).unwrap_or(u64::MAX), Ordering::Relaxed);
}

/// 记录发送失败后重新入队的事件数。
pub fn record_events_requeued(events: usize) {
    metrics()
        .events_requeued
        .fetch_add(u64::try_from(events).unwrap_or(u64::MAX), Ordering::Relaxed);
}

pub fn record_connect_failure() {
    metrics().connect_failures.fetch_add(1, Ordering::Relaxed);
}

pub fn record_write_failure() {
    metrics().write_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录新建连接（含 schema 初始化成功）次数。
pub fn record_connect() {
    metrics().connects.fetch_add(1, Ordering::Relaxed);
}

/// 记录单次批量发送耗时（毫秒）。
pub fn record_flush_latency_ms(latency_ms: u64) {
    let metrics = metrics();
    metrics
        .flush_latency_ms_total
        .fetch_add(latency_ms, Ordering::Relaxed);
    metrics
        .flush_latency_ms_count
        .fetch_add(1, Ordering::Relaxed);
}
