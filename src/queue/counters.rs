//! 队列生命周期计数器
//!
//! 每个事件同时更新两个实例：按队列名标记的实例和 `_Total` 聚合实例。
//! 注册表在构造时注入（依赖注入），不使用进程级单例；
//! 未配置时退化为 Null 实现，调用点无需判空。

use std::sync::Arc;
use std::time::Duration;

use crate::metrics::{
    COUNTER_OFFLINE_REJECTS, COUNTER_QUEUE_FULL_REJECTS, COUNTER_REQUESTS_ENQUEUED,
    COUNTER_REQUESTS_ERROR, COUNTER_REQUESTS_SUCCESS, COUNTER_REQUESTS_TIMEOUT,
    COUNTER_RESPONSES_RECEIVED, GAUGE_REQUESTS_BACKED_OFF, GAUGE_REQUESTS_INFLIGHT,
    GAUGE_REQUESTS_QUEUED, HISTOGRAM_EXECUTION_SECONDS, TOTAL_INSTANCE,
};

/// 队列计数器接口：每个生命周期事件一个方法
pub trait QueueCounters: Send + Sync {
    fn on_enqueued(&self);
    fn on_response_received(&self);
    fn on_success(&self);
    fn on_error(&self);
    fn on_timeout(&self);
    fn on_queue_full_reject(&self);
    fn on_offline_reject(&self);
    fn inflight_delta(&self, delta: i64);
    fn queued_delta(&self, delta: i64);
    fn backed_off_delta(&self, delta: i64);
    fn add_execution_time(&self, elapsed: Duration);
}

/// Null 实现（未配置指标时使用）
pub struct NullQueueCounters;

impl QueueCounters for NullQueueCounters {
    fn on_enqueued(&self) {}
    fn on_response_received(&self) {}
    fn on_success(&self) {}
    fn on_error(&self) {}
    fn on_timeout(&self) {}
    fn on_queue_full_reject(&self) {}
    fn on_offline_reject(&self) {}
    fn inflight_delta(&self, _delta: i64) {}
    fn queued_delta(&self, _delta: i64) {}
    fn backed_off_delta(&self, _delta: i64) {}
    fn add_execution_time(&self, _elapsed: Duration) {}
}

/// 基于 `metrics` crate 的实现，按 `queue` 标签区分实例
pub struct MetricsQueueCounters {
    queue: String,
}

impl MetricsQueueCounters {
    pub fn new(queue: &str) -> Self {
        Self {
            queue: queue.to_string(),
        }
    }

    fn bump(&self, name: &'static str) {
        metrics::counter!(name, "queue" => self.queue.clone()).increment(1);
    }

    fn gauge_delta(&self, name: &'static str, delta: i64) {
        let gauge = metrics::gauge!(name, "queue" => self.queue.clone());
        if delta >= 0 {
            gauge.increment(delta as f64);
        } else {
            gauge.decrement((-delta) as f64);
        }
    }
}

impl QueueCounters for MetricsQueueCounters {
    fn on_enqueued(&self) {
        self.bump(COUNTER_REQUESTS_ENQUEUED);
    }

    fn on_response_received(&self) {
        self.bump(COUNTER_RESPONSES_RECEIVED);
    }

    fn on_success(&self) {
        self.bump(COUNTER_REQUESTS_SUCCESS);
    }

    fn on_error(&self) {
        self.bump(COUNTER_REQUESTS_ERROR);
    }

    fn on_timeout(&self) {
        self.bump(COUNTER_REQUESTS_TIMEOUT);
    }

    fn on_queue_full_reject(&self) {
        self.bump(COUNTER_QUEUE_FULL_REJECTS);
    }

    fn on_offline_reject(&self) {
        self.bump(COUNTER_OFFLINE_REJECTS);
    }

    fn inflight_delta(&self, delta: i64) {
        self.gauge_delta(GAUGE_REQUESTS_INFLIGHT, delta);
    }

    fn queued_delta(&self, delta: i64) {
        self.gauge_delta(GAUGE_REQUESTS_QUEUED, delta);
    }

    fn backed_off_delta(&self, delta: i64) {
        self.gauge_delta(GAUGE_REQUESTS_BACKED_OFF, delta);
    }

    fn add_execution_time(&self, elapsed: Duration) {
        metrics::histogram!(HISTOGRAM_EXECUTION_SECONDS, "queue" => self.queue.clone())
            .record(elapsed.as_secs_f64());
    }
}

/// 一对计数器实例：命名实例 + `_Total` 聚合实例，总是由同一调用点一起更新
#[derive(Clone)]
pub struct CountersPair {
    named: Arc<dyn QueueCounters>,
    total: Arc<dyn QueueCounters>,
}

impl CountersPair {
    pub fn new(named: Arc<dyn QueueCounters>, total: Arc<dyn QueueCounters>) -> Self {
        Self { named, total }
    }

    /// 两个实例都是 Null 的空对；调用点无需判空
    pub fn noop() -> Self {
        let null: Arc<dyn QueueCounters> = Arc::new(NullQueueCounters);
        Self {
            named: null.clone(),
            total: null,
        }
    }

    pub fn on_enqueued(&self) {
        self.named.on_enqueued();
        self.total.on_enqueued();
    }

    pub fn on_response_received(&self) {
        self.named.on_response_received();
        self.total.on_response_received();
    }

    pub fn on_success(&self) {
        self.named.on_success();
        self.total.on_success();
    }

    pub fn on_error(&self) {
        self.named.on_error();
        self.total.on_error();
    }

    pub fn on_timeout(&self) {
        self.named.on_timeout();
        self.total.on_timeout();
    }

    pub fn on_queue_full_reject(&self) {
        self.named.on_queue_full_reject();
        self.total.on_queue_full_reject();
    }

    pub fn on_offline_reject(&self) {
        self.named.on_offline_reject();
        self.total.on_offline_reject();
    }

    pub fn inflight_delta(&self, delta: i64) {
        self.named.inflight_delta(delta);
        self.total.inflight_delta(delta);
    }

    pub fn queued_delta(&self, delta: i64) {
        self.named.queued_delta(delta);
        self.total.queued_delta(delta);
    }

    pub fn backed_off_delta(&self, delta: i64) {
        self.named.backed_off_delta(delta);
        self.total.backed_off_delta(delta);
    }

    pub fn add_execution_time(&self, elapsed: Duration) {
        self.named.add_execution_time(elapsed);
        self.total.add_execution_time(elapsed);
    }
}

/// 计数器注册表：按队列名发放计数器对
#[derive(Clone)]
pub enum QueueCountersRegistry {
    /// 不记录任何指标
    Disabled,
    /// 记录到全局 Prometheus Recorder（见 `crate::metrics`）
    Metrics,
}

impl QueueCountersRegistry {
    pub fn pair(&self, queue_name: &str) -> CountersPair {
        match self {
            QueueCountersRegistry::Disabled => CountersPair::noop(),
            QueueCountersRegistry::Metrics => CountersPair::new(
                Arc::new(MetricsQueueCounters::new(queue_name)),
                Arc::new(MetricsQueueCounters::new(TOTAL_INSTANCE)),
            ),
        }
    }
}

/// 应用层调用计数：成功/错误/超时次数与单次执行时间
pub trait AppCallCounters: Send + Sync {
    fn on_success(&self, elapsed: Duration);
    fn on_error(&self);
    fn on_timeout(&self);
}

/// 默认空实现
pub struct NoopAppCallCounters;

impl AppCallCounters for NoopAppCallCounters {
    fn on_success(&self, _elapsed: Duration) {}
    fn on_error(&self) {}
    fn on_timeout(&self) {}
}
