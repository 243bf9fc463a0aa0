//! 运行配置加载。

use domain::{Precision, Tags};
use std::env;
use std::time::Duration;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

pub const DEFAULT_DATABASE: &str = "fluxlog";
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_ERROR_LOG_INTERVAL: Duration = Duration::from_secs(3600);

/// 时序库连接与缓冲配置。
#[derive(Debug, Clone)]
pub struct FluxlogConfig {
    pub address: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: String,
    pub precision: Precision,
    pub retention_policy: Option<String>,
    pub flush_interval: Duration,
    pub error_log_interval: Duration,
    pub queue_capacity: usize,
    pub async_overflow: bool,
    pub global_tags: Tags,
    pub measurement_whitelist: Vec<String>,
    pub save_metadata: bool,
    pub http_addr: String,
}

impl Default for FluxlogConfig {
    fn default() -> Self {
        Self {
            address: None,
            username: None,
            password: None,
            database: DEFAULT_DATABASE.to_string(),
            precision: Precision::default(),
            retention_policy: None,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            error_log_interval: DEFAULT_ERROR_LOG_INTERVAL,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            async_overflow: false,
            global_tags: Tags::new(),
            measurement_whitelist: Vec::new(),
            save_metadata: false,
            http_addr: "127.0.0.1:9100".to_string(),
        }
    }
}

impl FluxlogConfig {
    /// 从环境变量读取配置，未设置的项使用默认值。
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let address = read_optional("FLUXLOG_ADDRESS");
        let username = read_optional("FLUXLOG_USERNAME");
        let password = read_optional("FLUXLOG_PASSWORD");
        let database = read_optional("FLUXLOG_DATABASE").unwrap_or(defaults.database);
        let precision = match read_optional("FLUXLOG_PRECISION") {
            Some(value) => value
                .parse::<Precision>()
                .map_err(|_| ConfigError::Invalid("FLUXLOG_PRECISION".to_string(), value))?,
            None => defaults.precision,
        };
        let retention_policy = read_optional("FLUXLOG_RETENTION_POLICY");
        let flush_interval = Duration::from_millis(read_u64_with_default(
            "FLUXLOG_FLUSH_INTERVAL_MS",
            u64::try_from(defaults.flush_interval.as_millis()).unwrap_or(u64::MAX),
        )?);
        let error_log_interval = Duration::from_secs(read_u64_with_default(
            "FLUXLOG_ERROR_LOG_INTERVAL_SECONDS",
            defaults.error_log_interval.as_secs(),
        )?);
        let queue_capacity = read_u64_with_default(
            "FLUXLOG_QUEUE_CAPACITY",
            u64::try_from(defaults.queue_capacity).unwrap_or(u64::MAX),
        )?;
        let queue_capacity = match usize::try_from(queue_capacity) {
            Ok(capacity) if capacity > 0 => capacity,
            _ => {
                return Err(ConfigError::Invalid(
                    "FLUXLOG_QUEUE_CAPACITY".to_string(),
                    queue_capacity.to_string(),
                ));
            }
        };
        let async_overflow = read_bool_with_default("FLUXLOG_ASYNC_OVERFLOW", false);
        let global_tags = match read_optional("FLUXLOG_GLOBAL_TAGS") {
            Some(value) => parse_tags(&value)
                .ok_or_else(|| ConfigError::Invalid("FLUXLOG_GLOBAL_TAGS".to_string(), value))?,
            None => Tags::new(),
        };
        let measurement_whitelist = read_optional("FLUXLOG_MEASUREMENT_WHITELIST")
            .map(|value| parse_list(&value))
            .unwrap_or_default();
        let save_metadata = read_bool_with_default("FLUXLOG_SAVE_METADATA", false);
        let http_addr = env::var("FLUXLOG_HTTP_ADDR").unwrap_or(defaults.http_addr);

        Ok(Self {
            address,
            username,
            password,
            database,
            precision,
            retention_policy,
            flush_interval,
            error_log_interval,
            queue_capacity,
            async_overflow,
            global_tags,
            measurement_whitelist,
            save_metadata,
            http_addr,
        })
    }
}

/// 解析 `k=v,k2=v2` 形式的 tag 列表。
pub fn parse_tags(value: &str) -> Option<Tags> {
    let mut tags = Tags::new();
    for pair in value.split(',').map(str::trim).filter(|pair| !pair.is_empty()) {
        let (key, val) = pair.split_once('=')?;
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        tags.insert(key.to_string(), val.trim().to_string());
    }
    Some(tags)
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}
