pub mod data;

pub use data::{
    Batch, Event, EventError, FieldValue, Fields, IdentifierFault, KEY_SPECIAL, MEASUREMENT_SPECIAL,
    Tags, check_identifier,
};

use std::fmt;
use std::str::FromStr;

/// 写入时间戳精度（InfluxDB 命名）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Precision {
    Nanoseconds,
    Microseconds,
    #[default]
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
}

/// 无法识别的精度字符串。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown precision: {0}")]
pub struct UnknownPrecision(pub String);

impl Precision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::Nanoseconds => "n",
            Precision::Microseconds => "u",
            Precision::Milliseconds => "ms",
            Precision::Seconds => "s",
            Precision::Minutes => "m",
            Precision::Hours => "h",
        }
    }

    /// 纳秒时间戳按当前精度截断。
    pub fn convert(&self, ts_ns: i64) -> i64 {
        let divisor: i64 = match self {
            Precision::Nanoseconds => 1,
            Precision::Microseconds => 1_000,
            Precision::Milliseconds => 1_000_000,
            Precision::Seconds => 1_000_000_000,
            Precision::Minutes => 60_000_000_000,
            Precision::Hours => 3_600_000_000_000,
        };
        ts_ns.div_euclid(divisor)
    }
}

impl FromStr for Precision {
    type Err = UnknownPrecision;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "n" | "ns" => Ok(Precision::Nanoseconds),
            "u" | "us" => Ok(Precision::Microseconds),
            "ms" => Ok(Precision::Milliseconds),
            "s" => Ok(Precision::Seconds),
            "m" => Ok(Precision::Minutes),
            "h" => Ok(Precision::Hours),
            other => Err(UnknownPrecision(other.to_string())),
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
