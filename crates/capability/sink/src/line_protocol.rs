//! InfluxDB line protocol 编码
//!
//! 每个事件编码为一行：
//! `measurement[,tag=value...] field=value[,field=value...] timestamp`
//!
//! - measurement 中的逗号、空格需转义
//! - tag key/value 与 field key 中的逗号、等号、空格需转义
//! - 字符串字段加双引号，内部的 `"` 与 `\` 转义
//! - 整数字段追加 `i` 后缀
//! - 空值 tag 被跳过（服务端不接受空 tag 值）
//! - 换行、分隔符前或末尾的反斜杠无法表达，直接拒绝编码

use crate::error::SinkError;
use domain::{
    Batch, Event, FieldValue, IdentifierFault, KEY_SPECIAL, MEASUREMENT_SPECIAL, Precision,
    check_identifier,
};
use std::fmt::Write;

/// 将一个批次编码为多行文本。
pub fn encode_batch(batch: &Batch) -> Result<String, SinkError> {
    let mut out = String::with_capacity(batch.len() * 64);
    for event in &batch.events {
        encode_event(&mut out, event, batch.precision)?;
        out.push('\n');
    }
    Ok(out)
}

/// 编码单个事件（不含行尾换行）。
pub fn encode_event(
    out: &mut String,
    event: &Event,
    precision: Precision,
) -> Result<(), SinkError> {
    if event.measurement.is_empty() {
        return Err(SinkError::Encode("empty measurement".to_string()));
    }
    if event.fields.is_empty() {
        return Err(SinkError::Encode(format!(
            "event {} has no fields",
            event.measurement
        )));
    }

    escape_into(out, &event.measurement, MEASUREMENT_SPECIAL)?;
    for (key, value) in &event.tags {
        if value.is_empty() {
            continue;
        }
        out.push(',');
        escape_into(out, key, KEY_SPECIAL)?;
        out.push('=');
        escape_into(out, value, KEY_SPECIAL)?;
    }

    out.push(' ');
    for (index, (key, value)) in event.fields.iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        escape_into(out, key, KEY_SPECIAL)?;
        out.push('=');
        match value {
            FieldValue::I64(v) => {
                let _ = write!(out, "{}i", v);
            }
            FieldValue::F64(v) => {
                if !v.is_finite() {
                    return Err(SinkError::Encode(format!("field {} is not finite", key)));
                }
                let _ = write!(out, "{}", v);
            }
            FieldValue::Bool(v) => out.push_str(if *v { "true" } else { "false" }),
            FieldValue::String(v) => {
                out.push('"');
                for ch in v.chars() {
                    if ch == '"' || ch == '\\' {
                        out.push('\\');
                    }
                    out.push(ch);
                }
                out.push('"');
            }
        }
    }

    let _ = write!(out, " {}", precision.convert(event.ts_ns));
    Ok(())
}

fn escape_into(out: &mut String, value: &str, special: &[char]) -> Result<(), SinkError> {
    check_identifier(value, special).map_err(|fault| {
        let reason = match fault {
            IdentifierFault::LineBreak => "line break",
            IdentifierFault::DanglingBackslash => "dangling backslash",
        };
        SinkError::Encode(format!("{reason} in {value:?}"))
    })?;
    for ch in value.chars() {
        if special.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    Ok(())
}
