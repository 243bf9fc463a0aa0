//! Fluxlog 引擎：组装队列、背压、连接管理与刷新守护任务，对外提供写入与管理入口。
//!
//! 典型用法：
//! 1. `Fluxlog::new(sink, &config)` 按配置构建（此时不会连接写入端）
//! 2. `engine.start()` 启动刷新守护任务，拿到 [`DaemonHandle`]
//! 3. 生产者调用 `engine.write(...)`
//! 4. 退出时 `engine.close()` 后 `handle.shutdown().await`，剩余事件被最后一次刷新带走

use domain::{Event, FieldValue, Fields, Precision, Tags};
use fluxlog_config::FluxlogConfig;
use fluxlog_enrich::{EnrichError, Enricher};
use fluxlog_pipeline::{BoundedQueue, ConnectionManager, FlushDaemon, FlushSettings};
use fluxlog_sink::{QueryResult, Sink, SinkTarget};
use fluxlog_telemetry::{record_event_enqueued, record_event_rejected};
use regex::Regex;
use std::collections::HashMap;
use std::future::Future;
use std::panic::Location;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, info};

pub use fluxlog_pipeline::{
    Backpressure, DaemonHandle, EnqueueOutcome, PipelineError, TickOutcome, WriteSettings,
};

/// writef 占位符：`%d`、`%+v`、`%#x` 等。
static PLACEHOLDER: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"%[#+]?[a-zA-Z]"));

/// 遥测缓冲引擎。
pub struct Fluxlog {
    queue: BoundedQueue,
    connection: Arc<ConnectionManager>,
    daemon: Arc<FlushDaemon>,
    enricher: Enricher,
}

impl Fluxlog {
    pub fn new(sink: Arc<dyn Sink>, config: &FluxlogConfig) -> Self {
        let mut target = SinkTarget::new(config.address.clone().unwrap_or_default());
        target.username = config.username.clone();
        target.password = config.password.clone();
        let settings = WriteSettings {
            database: config.database.clone(),
            precision: config.precision,
            retention_policy: config.retention_policy.clone(),
        };
        let connection = Arc::new(ConnectionManager::new(sink, target, settings));

        let queue = BoundedQueue::new(config.queue_capacity);
        if config.async_overflow {
            queue.set_backpressure(Backpressure::AsyncOverflow);
        }

        let flush = Arc::new(FlushSettings::new(
            config.flush_interval,
            config.error_log_interval,
        ));
        let daemon = Arc::new(FlushDaemon::new(queue.clone(), connection.clone(), flush));
        let enricher = Enricher::with_config(
            config.measurement_whitelist.clone(),
            config.global_tags.clone(),
            config.save_metadata,
        );

        Self {
            queue,
            connection,
            daemon,
            enricher,
        }
    }

    /// 启动刷新守护任务。需要在 tokio 运行时内调用。
    pub fn start(&self) -> DaemonHandle {
        info!(
            target: "fluxlog.engine",
            capacity = self.queue.capacity(),
            database = %self.connection.write_settings().database,
            "engine_started"
        );
        fluxlog_pipeline::start(self.daemon.clone())
    }

    /// 写入一条事件。
    ///
    /// 白名单与字段校验在调用时同步完成，失败立即返回；
    /// 返回的 future 只可能在队列容量上等待（`Block` 模式）。
    /// 开启元数据时记录的是调用 `write` 的源码位置。
    #[track_caller]
    pub fn write(
        &self,
        measurement: &str,
        fields: Fields,
        tags: Tags,
    ) -> impl Future<Output = Result<EnqueueOutcome, PipelineError>> + '_ {
        let prepared = self.prepare(measurement, fields, tags, Location::caller());
        self.enqueue(prepared)
    }

    /// 以类似格式化日志的方式写入：measurement 中每个占位符按顺序取一个值，
    /// 字段名为去掉 `%` 的占位符加同类计数，如 `"%d of %d"` 得到 `d1`、`d2`。
    ///
    /// measurement 原样保留；值不足时返回 `Validation`，多余的值被忽略。
    #[track_caller]
    pub fn writef(
        &self,
        measurement: &str,
        values: &[FieldValue],
    ) -> impl Future<Output = Result<EnqueueOutcome, PipelineError>> + '_ {
        let caller = Location::caller();
        let prepared = if self.enricher.is_whitelisted(measurement) {
            placeholder_fields(measurement, values)
                .map_err(|reason| reject(measurement, reason))
                .and_then(|fields| self.prepare(measurement, fields, Tags::new(), caller))
        } else {
            let err = EnrichError::NotWhitelisted(measurement.to_string());
            Err(reject(measurement, err.to_string()))
        };
        self.enqueue(prepared)
    }

    async fn enqueue(
        &self,
        prepared: Result<Event, PipelineError>,
    ) -> Result<EnqueueOutcome, PipelineError> {
        let event = prepared?;
        let outcome = self.queue.enqueue(event).await?;
        record_event_enqueued();
        Ok(outcome)
    }

    fn prepare(
        &self,
        measurement: &str,
        fields: Fields,
        tags: Tags,
        caller: &Location<'_>,
    ) -> Result<Event, PipelineError> {
        let (fields, tags) = self
            .enricher
            .enrich(measurement, fields, tags, caller)
            .map_err(|err| reject(measurement, err.to_string()))?;
        let event = Event::new(measurement, fields, tags);
        event
            .validate()
            .map_err(|err| reject(measurement, err.to_string()))?;
        Ok(event)
    }

    /// 立即执行一个刷新周期。
    pub async fn flush_now(&self) -> TickOutcome {
        self.daemon.tick().await
    }

    /// 先刷新队列再执行管理命令，保证命令能看到此前写入的数据。
    pub async fn run_command(&self, command: &str) -> Result<Vec<QueryResult>, PipelineError> {
        self.flush_now().await;
        self.connection.run_command(command).await
    }

    pub async fn connect(&self) -> Result<(), PipelineError> {
        self.connection.ensure_connected().await
    }

    pub async fn disconnect(&self) {
        self.connection.disconnect().await;
    }

    pub async fn is_connected(&self) -> bool {
        self.connection.is_connected().await
    }

    /// 关闭队列：阻塞中的生产者返回 `QueueClosed`，已入队事件仍会被刷新。
    pub fn close(&self) {
        self.queue.close();
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn pending_overflow(&self) -> usize {
        self.queue.pending_overflow()
    }

    pub fn write_settings(&self) -> WriteSettings {
        self.connection.write_settings()
    }

    pub fn target(&self) -> SinkTarget {
        self.connection.target()
    }

    pub fn set_address(&self, address: &str) {
        self.connection.set_address(address);
    }

    pub fn set_username(&self, username: &str) {
        self.connection.set_username(non_empty(username));
    }

    pub fn set_password(&self, password: &str) {
        self.connection.set_password(non_empty(password));
    }

    pub async fn change_database(&self, name: &str) -> Result<(), PipelineError> {
        self.connection.change_database(name).await
    }

    pub fn set_precision(&self, precision: Precision) {
        self.connection.set_precision(precision);
    }

    pub fn set_retention_policy(&self, retention_policy: &str) {
        self.connection
            .set_retention_policy(non_empty(retention_policy));
    }

    pub fn set_flush_interval(&self, interval: Duration) {
        self.daemon.settings().set_flush_interval(interval);
    }

    pub fn flush_interval(&self) -> Duration {
        self.daemon.settings().flush_interval()
    }

    pub fn set_error_log_interval(&self, interval: Duration) {
        self.daemon.settings().set_error_log_interval(interval);
    }

    pub fn set_async_overflow(&self, enabled: bool) {
        let mode = if enabled {
            Backpressure::AsyncOverflow
        } else {
            Backpressure::Block
        };
        self.queue.set_backpressure(mode);
    }

    pub fn backpressure(&self) -> Backpressure {
        self.queue.backpressure()
    }

    pub fn add_measurement_to_whitelist(&self, measurement: &str) {
        self.enricher.add_measurement_to_whitelist(measurement);
    }

    pub fn set_measurement_whitelist(&self, measurements: Vec<String>) {
        self.enricher.set_measurement_whitelist(measurements);
    }

    pub fn set_global_tags(&self, tags: Tags) {
        self.enricher.set_global_tags(tags);
    }

    pub fn global_tags(&self) -> Tags {
        self.enricher.global_tags()
    }

    pub fn set_save_metadata(&self, enabled: bool) {
        self.enricher.set_save_metadata(enabled);
    }
}

fn reject(measurement: &str, reason: String) -> PipelineError {
    record_event_rejected();
    debug!(
        target: "fluxlog.engine",
        measurement = %measurement,
        reason = %reason,
        "event_rejected"
    );
    PipelineError::Validation(reason)
}

fn placeholder_fields(measurement: &str, values: &[FieldValue]) -> Result<Fields, String> {
    let pattern = PLACEHOLDER.as_ref().map_err(|err| err.to_string())?;
    let mut seen: HashMap<&str, usize> = HashMap::new();
    let mut fields = Fields::new();
    for (index, found) in pattern.find_iter(measurement).enumerate() {
        let value = values
            .get(index)
            .ok_or_else(|| "insufficient number of fields provided".to_string())?;
        let name = found.as_str().trim_start_matches('%');
        let count = seen.entry(name).or_default();
        *count += 1;
        fields.insert(format!("{name}{count}"), value.clone());
    }
    Ok(fields)
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
