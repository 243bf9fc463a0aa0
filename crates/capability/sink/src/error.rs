//! 写入端错误类型
//!
//! 封装底层写入端返回的错误：
//! - 传输层错误（地址非法、网络不可达）
//! - 服务端拒绝（非 2xx 状态码、查询结果中的 error）
//! - 编码错误（事件无法转换为 line protocol）

/// 写入端错误。
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("server responded {status}: {message}")]
    Status { status: u16, message: String },
    #[error("command failed: {0}")]
    Command(String),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("{0}")]
    Rejected(String),
}

impl SinkError {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }
}

impl From<reqwest::Error> for SinkError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
