//! 离线检测与重连退避
//!
//! 连续错误/超时达到阈值后队列进入离线状态，重连间隔从
//! `reconnect_interval` 起按 2 倍增长，封顶 `max_backoff`；
//! 任意一次成功立即清除离线状态并复位间隔。
//! 状态只在队列的互斥锁内读写。

use std::time::{Duration, Instant};

use crate::config::HttpQueueConfig;

/// 退避控制器
#[derive(Debug)]
pub struct BackoffController {
    max_error_requests: u32,
    max_timed_out_requests: u32,
    reconnect_interval: Duration,
    max_backoff: Duration,

    consecutive_errors: u32,
    consecutive_timeouts: u32,
    offline: bool,
    current_delay: Duration,
    next_allowed: Option<Instant>,
}

impl BackoffController {
    pub fn new(config: &HttpQueueConfig) -> Self {
        Self {
            max_error_requests: config.max_error_requests,
            max_timed_out_requests: config.max_timed_out_requests,
            reconnect_interval: config.reconnect_interval(),
            max_backoff: config.max_backoff(),
            consecutive_errors: 0,
            consecutive_timeouts: 0,
            offline: false,
            current_delay: config.reconnect_interval(),
            next_allowed: None,
        }
    }

    /// 成功：清零计数、解除离线、复位重连间隔
    pub fn on_success(&mut self) {
        self.consecutive_errors = 0;
        self.consecutive_timeouts = 0;
        self.offline = false;
        self.current_delay = self.reconnect_interval;
        self.next_allowed = None;
    }

    /// 传输/连接错误
    pub fn on_error(&mut self, now: Instant) {
        self.consecutive_errors += 1;
        let threshold_hit = self.consecutive_errors >= self.max_error_requests;
        self.after_failure(now, threshold_hit);
    }

    /// 单次请求超时（排队超时不计入，未上线的请求不构成远端故障证据）
    pub fn on_timeout(&mut self, now: Instant) {
        self.consecutive_timeouts += 1;
        let threshold_hit = self.consecutive_timeouts >= self.max_timed_out_requests;
        self.after_failure(now, threshold_hit);
    }

    fn after_failure(&mut self, now: Instant, threshold_hit: bool) {
        if self.offline {
            // 离线期间的探测再次失败：间隔翻倍，封顶
            self.current_delay = (self.current_delay * 2).min(self.max_backoff);
            self.next_allowed = Some(now + self.current_delay);
        } else if threshold_hit {
            self.offline = true;
            self.next_allowed = Some(now + self.current_delay);
        }
    }

    /// 当前是否允许发起新的 dispatch
    pub fn allows(&self, now: Instant) -> bool {
        !self.offline || self.next_allowed.map_or(true, |t| now >= t)
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    pub fn next_allowed(&self) -> Option<Instant> {
        self.next_allowed
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    pub fn consecutive_timeouts(&self) -> u32 {
        self.consecutive_timeouts
    }

    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_errors: u32, reconnect_ms: u64, max_backoff_ms: u64) -> HttpQueueConfig {
        HttpQueueConfig {
            max_error_requests: max_errors,
            max_timed_out_requests: max_errors,
            reconnect_interval_ms: reconnect_ms,
            max_backoff_ms,
            ..HttpQueueConfig::default()
        }
    }

    #[test]
    fn test_goes_offline_after_error_threshold() {
        let mut backoff = BackoffController::new(&config(3, 1000, 8000));
        let now = Instant::now();

        backoff.on_error(now);
        backoff.on_error(now);
        assert!(!backoff.is_offline());
        assert!(backoff.allows(now));

        backoff.on_error(now);
        assert!(backoff.is_offline());
        assert!(!backoff.allows(now));
        // 窗口结束后允许探测
        assert!(backoff.allows(now + Duration::from_millis(1001)));
    }

    #[test]
    fn test_delay_doubles_while_offline_and_is_capped() {
        let mut backoff = BackoffController::new(&config(1, 1000, 3000));
        let now = Instant::now();

        backoff.on_error(now);
        assert!(backoff.is_offline());
        assert_eq!(backoff.current_delay(), Duration::from_millis(1000));

        backoff.on_error(now);
        assert_eq!(backoff.current_delay(), Duration::from_millis(2000));

        backoff.on_error(now);
        assert_eq!(backoff.current_delay(), Duration::from_millis(3000));

        // 封顶后不再增长
        backoff.on_error(now);
        assert_eq!(backoff.current_delay(), Duration::from_millis(3000));
    }

    #[test]
    fn test_success_resets_everything() {
        let mut backoff = BackoffController::new(&config(2, 1000, 8000));
        let now = Instant::now();

        backoff.on_error(now);
        backoff.on_timeout(now);
        backoff.on_error(now);
        assert!(backoff.is_offline());

        backoff.on_success();
        assert!(!backoff.is_offline());
        assert_eq!(backoff.consecutive_errors(), 0);
        assert_eq!(backoff.consecutive_timeouts(), 0);
        assert_eq!(backoff.current_delay(), Duration::from_millis(1000));
        assert!(backoff.allows(now));
    }

    #[test]
    fn test_mixed_failures_track_separate_counters() {
        let mut backoff = BackoffController::new(&config(3, 1000, 8000));
        let now = Instant::now();

        // 错误和超时各 2 次，均未达到各自阈值 3
        backoff.on_error(now);
        backoff.on_timeout(now);
        backoff.on_error(now);
        backoff.on_timeout(now);
        assert!(!backoff.is_offline());
        assert_eq!(backoff.consecutive_errors(), 2);
        assert_eq!(backoff.consecutive_timeouts(), 2);
    }
}
