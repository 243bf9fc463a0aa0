//! # Fluxlog Sink 模块
//!
//! 时序写入端抽象层。缓冲/刷新核心只通过本模块的 Trait 与远端时序库交互，
//! 传输协议、编码与认证方式都封装在具体实现中。
//!
//! ## 架构设计
//!
//! 1. **接口抽象层** (`traits.rs`)：`Sink`（建立连接）与 `SinkConnection`（连接句柄）
//! 2. **数据模型层** (`models.rs`)：连接目标、管理命令结果集
//! 3. **错误处理层** (`error.rs`)：统一的写入端错误类型
//! 4. **编码层** (`line_protocol.rs`)：事件到 InfluxDB line protocol 的转换
//! 5. **实现层**：
//!    - `http`：InfluxDB 1.x HTTP API（生产环境使用）
//!    - `in_memory`：内存实现（用于测试和演示，可模拟故障）
//!
//! ## 连接句柄语义
//!
//! - `Sink::connect` 只负责建立传输层句柄，不做 schema 初始化
//! - `SinkConnection::ensure_schema` 默认执行 `CREATE DATABASE "<db>"`
//! - 句柄本身不做重连；任何错误由上层连接管理器决定是否丢弃句柄
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use fluxlog_sink::{HttpSink, Sink, SinkTarget};
//!
//! let sink = HttpSink::new();
//! let conn = sink.connect(&SinkTarget::new("http://localhost:8086")).await?;
//! conn.ensure_schema("fluxlog").await?;
//! ```

pub mod error;
pub mod http;
pub mod in_memory;
pub mod line_protocol;
pub mod models;
pub mod traits;

pub use error::*;
pub use http::HttpSink;
pub use in_memory::InMemorySink;
pub use models::*;
pub use traits::*;
