//! HTTP 中间件

pub mod timing;

pub use timing::{RequestTiming, record_request};
