use std::collections::BTreeMap;

use crate::Precision;

/// 事件字段值的数据类型。
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    I64(i64),
    F64(f64),
    Bool(bool),
    String(String),
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::I64(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::I64(i64::from(value))
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::I64(i64::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::F64(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

pub type Fields = BTreeMap<String, FieldValue>;
pub type Tags = BTreeMap<String, String>;

/// 事件校验错误。
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EventError {
    #[error("measurement must not be empty")]
    EmptyMeasurement,
    #[error("event for {0} has no fields")]
    EmptyFields(String),
    #[error("field key must not be empty")]
    EmptyFieldKey,
    #[error("tag key must not be empty")]
    EmptyTagKey,
    #[error("field {0} is not a finite number")]
    NonFiniteField(String),
    #[error("{0} contains a line break")]
    LineBreak(String),
    #[error("{0} has a backslash before a separator or at the end")]
    DanglingBackslash(String),
}

/// measurement 中需要转义的字符。
pub const MEASUREMENT_SPECIAL: &[char] = &[',', ' '];
/// tag key、tag value 与 field key 中需要转义的字符。
pub const KEY_SPECIAL: &[char] = &[',', '=', ' '];

/// 行协议无法表达的标识符：含换行，或反斜杠落在分隔符前/末尾（会吞掉转义）。
pub fn check_identifier(value: &str, special: &[char]) -> Result<(), IdentifierFault> {
    if value.contains(['\n', '\r']) {
        return Err(IdentifierFault::LineBreak);
    }
    let mut chars = value.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.peek() {
                None => return Err(IdentifierFault::DanglingBackslash),
                Some(next) if special.contains(next) => {
                    return Err(IdentifierFault::DanglingBackslash);
                }
                Some(_) => {}
            }
        }
    }
    Ok(())
}

/// [`check_identifier`] 的失败原因。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierFault {
    LineBreak,
    DanglingBackslash,
}

impl IdentifierFault {
    fn into_error(self, what: String) -> EventError {
        match self {
            IdentifierFault::LineBreak => EventError::LineBreak(what),
            IdentifierFault::DanglingBackslash => EventError::DanglingBackslash(what),
        }
    }
}

/// 一条遥测事件：measurement + fields + tags + 入队时刻。
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub measurement: String,
    pub fields: Fields,
    pub tags: Tags,
    /// Unix 纪元纳秒。
    pub ts_ns: i64,
}

impl Event {
    /// 以当前时刻构造事件。
    pub fn new(measurement: impl Into<String>, fields: Fields, tags: Tags) -> Self {
        Self::with_timestamp(measurement, fields, tags, now_epoch_ns())
    }

    pub fn with_timestamp(
        measurement: impl Into<String>,
        fields: Fields,
        tags: Tags,
        ts_ns: i64,
    ) -> Self {
        Self {
            measurement: measurement.into(),
            fields,
            tags,
            ts_ns,
        }
    }

    /// 检查事件能否被写入端编码。
    pub fn validate(&self) -> Result<(), EventError> {
        if self.measurement.is_empty() {
            return Err(EventError::EmptyMeasurement);
        }
        check_identifier(&self.measurement, MEASUREMENT_SPECIAL)
            .map_err(|fault| fault.into_error("measurement".to_string()))?;
        if self.fields.is_empty() {
            return Err(EventError::EmptyFields(self.measurement.clone()));
        }
        for (key, value) in &self.fields {
            if key.is_empty() {
                return Err(EventError::EmptyFieldKey);
            }
            check_identifier(key, KEY_SPECIAL)
                .map_err(|fault| fault.into_error(format!("field key {key:?}")))?;
            if let FieldValue::F64(v) = value {
                if !v.is_finite() {
                    return Err(EventError::NonFiniteField(key.clone()));
                }
            }
        }
        for (key, value) in &self.tags {
            if key.is_empty() {
                return Err(EventError::EmptyTagKey);
            }
            check_identifier(key, KEY_SPECIAL)
                .map_err(|fault| fault.into_error(format!("tag key {key:?}")))?;
            check_identifier(value, KEY_SPECIAL)
                .map_err(|fault| fault.into_error(format!("tag {key:?} value")))?;
        }
        Ok(())
    }
}

/// 单次刷新周期内取出的一批事件。
///
/// 发送失败时不会整体重试，而是通过 [`Batch::into_events`] 拆回事件重新入队。
#[derive(Debug, Clone)]
pub struct Batch {
    pub database: String,
    pub precision: Precision,
    pub retention_policy: Option<String>,
    pub events: Vec<Event>,
}

impl Batch {
    pub fn new(
        database: impl Into<String>,
        precision: Precision,
        retention_policy: Option<String>,
        events: Vec<Event>,
    ) -> Self {
        Self {
            database: database.into(),
            precision,
            retention_policy,
            events,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }
}

fn now_epoch_ns() -> i64 {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX)
}
