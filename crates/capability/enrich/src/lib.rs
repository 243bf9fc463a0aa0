//! 写入前处理：measurement 白名单、全局 tag 合并、调用位置元数据。

use domain::{FieldValue, Fields, Tags};
use std::panic::Location;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

/// 写入前处理错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnrichError {
    #[error("measurement {0} not in whitelist")]
    NotWhitelisted(String),
}

/// 写入前处理器。所有配置可在运行期修改。
#[derive(Debug, Default)]
pub struct Enricher {
    whitelist: RwLock<Vec<String>>,
    global_tags: RwLock<Tags>,
    save_metadata: AtomicBool,
}

impl Enricher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(whitelist: Vec<String>, global_tags: Tags, save_metadata: bool) -> Self {
        Self {
            whitelist: RwLock::new(whitelist),
            global_tags: RwLock::new(global_tags),
            save_metadata: AtomicBool::new(save_metadata),
        }
    }

    pub fn add_measurement_to_whitelist(&self, measurement: impl Into<String>) {
        self.whitelist
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(measurement.into());
    }

    /// 替换整个白名单；空列表表示允许所有 measurement。
    pub fn set_measurement_whitelist(&self, measurements: Vec<String>) {
        *self.whitelist.write().unwrap_or_else(PoisonError::into_inner) = measurements;
    }

    pub fn is_whitelisted(&self, measurement: &str) -> bool {
        let whitelist = self.whitelist.read().unwrap_or_else(PoisonError::into_inner);
        whitelist.is_empty() || whitelist.iter().any(|allowed| allowed == measurement)
    }

    pub fn set_global_tags(&self, tags: Tags) {
        *self.global_tags.write().unwrap_or_else(PoisonError::into_inner) = tags;
    }

    pub fn global_tags(&self) -> Tags {
        self.global_tags
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_save_metadata(&self, enabled: bool) {
        self.save_metadata.store(enabled, Ordering::Relaxed);
    }

    pub fn save_metadata(&self) -> bool {
        self.save_metadata.load(Ordering::Relaxed)
    }

    /// 校验白名单并合并 tag/元数据。调用方提供的 tag 与字段优先。
    pub fn enrich(
        &self,
        measurement: &str,
        fields: Fields,
        tags: Tags,
        caller: &Location<'_>,
    ) -> Result<(Fields, Tags), EnrichError> {
        if !self.is_whitelisted(measurement) {
            return Err(EnrichError::NotWhitelisted(measurement.to_string()));
        }

        let mut merged_tags = self.global_tags();
        merged_tags.extend(tags);

        let fields = if self.save_metadata() {
            let mut merged = metadata_fields(caller);
            merged.extend(fields);
            merged
        } else {
            fields
        };
        Ok((fields, merged_tags))
    }
}

/// 调用位置字段：file（仅文件名）、line、column。
pub fn metadata_fields(caller: &Location<'_>) -> Fields {
    let file = std::path::Path::new(caller.file())
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_else(|| caller.file());
    let mut fields = Fields::new();
    fields.insert("file".to_string(), FieldValue::String(file.to_string()));
    fields.insert("line".to_string(), FieldValue::I64(i64::from(caller.line())));
    fields.insert("column".to_string(), FieldValue::I64(i64::from(caller.column())));
    fields
}
