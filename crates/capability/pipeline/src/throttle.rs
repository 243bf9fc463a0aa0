//! 失败日志节流
//!
//! 连续失败期间每个间隔最多输出一行错误日志；失败后首次成功输出一行恢复日志并清空状态。

use std::time::Duration;
use tokio::time::Instant;

/// 刷新守护任务持有的失败日志状态。
#[derive(Debug, Default)]
pub struct ErrorLogThrottle {
    next_allowed_log_time: Option<Instant>,
    failing: bool,
}

impl ErrorLogThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次失败，返回本次是否应输出日志。
    pub fn on_failure(&mut self, now: Instant, interval: Duration) -> bool {
        self.failing = true;
        match self.next_allowed_log_time {
            Some(next) if now < next => false,
            _ => {
                self.next_allowed_log_time = Some(now + interval);
                true
            }
        }
    }

    /// 记录一次成功，返回是否刚从失败中恢复。
    pub fn on_success(&mut self) -> bool {
        let recovered = self.failing;
        self.failing = false;
        self.next_allowed_log_time = None;
        recovered
    }
}
