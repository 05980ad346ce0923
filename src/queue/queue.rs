//! 出站 HTTP 请求队列
//!
//! 职责：
//! - 接收任意多个并发调用方的非阻塞入队
//! - 按 FIFO 顺序在并发上限与退避窗口约束下 admission
//! - 驱动 Dispatcher 执行并把终态恰好一次地回调给调用方
//! - 独立于 admission 的排队超时清理（离线期间调用方也不会被饿死）
//!
//! `QueueState` 是唯一的可变共享状态，所有读写都在互斥锁内。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, info, warn};

use crate::config::HttpQueueConfig;
use crate::queue::backoff::BackoffController;
use crate::queue::counters::{AppCallCounters, CountersPair, QueueCountersRegistry};
use crate::queue::dispatcher::{Dispatcher, HttpTransport};
use crate::queue::limiter::ConcurrencyLimiter;
use crate::queue::request::{
    HttpQueueResult, HttpQueueResultCode, HttpRequestSpec, QueuedRequest,
};

/// 队列运行状态快照
#[derive(Debug, Clone)]
pub struct QueueStats {
    pub pending: usize,
    pub inflight: usize,
    pub is_offline: bool,
    pub consecutive_errors: u32,
    pub consecutive_timeouts: u32,
    pub current_backoff_ms: u64,
    pub concurrency_rejects: u64,
}

struct QueueState {
    pending: VecDeque<QueuedRequest>,
    backoff: BackoffController,
    /// 当前因离线滞留在队列中的请求数（backed-off gauge 的对账值）
    backed_off: usize,
    /// 离线窗口内是否已安排过唤醒，避免重复定时器
    reattempt_scheduled: bool,
}

struct QueueShared {
    name: String,
    config: HttpQueueConfig,
    state: Mutex<QueueState>,
    limiter: ConcurrencyLimiter,
    dispatcher: Dispatcher,
    counters: CountersPair,
    shutdown: AtomicBool,
    runtime: tokio::runtime::Handle,
}

/// 出站 HTTP 请求队列；Clone 共享同一实例
#[derive(Clone)]
pub struct RequestQueue {
    shared: Arc<QueueShared>,
}

impl RequestQueue {
    /// 创建队列。必须在 tokio runtime 上下文内调用（内部任务用当前 runtime 调度）。
    pub fn new(
        name: &str,
        config: HttpQueueConfig,
        transport: Arc<dyn HttpTransport>,
        registry: &QueueCountersRegistry,
        app_counters: Arc<dyn AppCallCounters>,
    ) -> Self {
        let counters = registry.pair(name);
        let dispatcher = Dispatcher::new(transport, &config, counters.clone(), app_counters);
        let backoff = BackoffController::new(&config);
        let limiter = ConcurrencyLimiter::new(config.max_concurrent_requests);

        Self {
            shared: Arc::new(QueueShared {
                name: name.to_string(),
                config,
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    backoff,
                    backed_off: 0,
                    reattempt_scheduled: false,
                }),
                limiter,
                dispatcher,
                counters,
                shutdown: AtomicBool::new(false),
                runtime: tokio::runtime::Handle::current(),
            }),
        }
    }

    /// 启动排队超时清理任务
    pub fn start(&self) {
        let queue = self.clone();
        let period_ms = (self.shared.config.queue_timeout_ms / 4).clamp(10, 1000);
        self.shared.runtime.spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(period_ms));
            loop {
                interval.tick().await;
                if queue.shared.shutdown.load(Ordering::Acquire) {
                    break;
                }
                queue.expire_overdue();
            }
        });
        info!(queue = %self.shared.name, "request queue started");
    }

    /// 入队一个请求。永不阻塞调用方。
    ///
    /// 容量耗尽时立即以 QueueFull（离线期间为 Offline）回调；
    /// 否则追加到 FIFO 并触发一次 admission。
    pub fn enqueue<F>(&self, spec: HttpRequestSpec, callback: F)
    where
        F: FnOnce(HttpQueueResult) + Send + 'static,
    {
        let callback: crate::queue::request::HttpRequestCallback = Box::new(callback);

        if self.shared.shutdown.load(Ordering::Acquire) {
            callback(HttpQueueResult::error(
                None,
                "request queue is shut down".to_string(),
                bytes::Bytes::new(),
                Duration::ZERO,
            ));
            return;
        }

        // 拒绝时把回调从锁内带出来，在锁外触发
        let rejected = {
            let mut state = self.shared.state.lock();
            let depth = state.pending.len() + self.shared.limiter.inflight();
            if depth >= self.shared.config.max_queued_requests {
                Some((state.backoff.is_offline(), callback))
            } else {
                state.pending.push_back(QueuedRequest {
                    spec,
                    callback,
                    enqueued_at: Instant::now(),
                });
                self.sync_backed_off(&mut state);
                None
            }
        };

        match rejected {
            Some((true, callback)) => {
                self.shared.counters.on_offline_reject();
                debug!(queue = %self.shared.name, "enqueue rejected: endpoint offline and queue full");
                callback(HttpQueueResult::offline());
            }
            Some((false, callback)) => {
                self.shared.counters.on_queue_full_reject();
                debug!(queue = %self.shared.name, "enqueue rejected: queue full");
                callback(HttpQueueResult::queue_full());
            }
            None => {
                self.shared.counters.on_enqueued();
                self.shared.counters.queued_delta(1);
                self.pump();
            }
        }
    }

    /// 关闭队列：拒绝后续入队，所有排队中的请求以终态回调。
    /// 在途请求经由正常完成路径收尾。
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
        let drained: Vec<QueuedRequest> = {
            let mut state = self.shared.state.lock();
            let drained = state.pending.drain(..).collect();
            self.sync_backed_off(&mut state);
            drained
        };
        let count = drained.len();
        for request in drained {
            self.shared.counters.queued_delta(-1);
            (request.callback)(HttpQueueResult::error(
                None,
                "request queue is shutting down".to_string(),
                bytes::Bytes::new(),
                Duration::ZERO,
            ));
        }
        info!(queue = %self.shared.name, drained = count, "request queue shut down");
    }

    /// 状态快照
    pub fn stats(&self) -> QueueStats {
        let state = self.shared.state.lock();
        QueueStats {
            pending: state.pending.len(),
            inflight: self.shared.limiter.inflight(),
            is_offline: state.backoff.is_offline(),
            consecutive_errors: state.backoff.consecutive_errors(),
            consecutive_timeouts: state.backoff.consecutive_timeouts(),
            current_backoff_ms: state.backoff.current_delay().as_millis() as u64,
            concurrency_rejects: self.shared.limiter.rejected_total(),
        }
    }

    /// admission 循环：入队和每次完成时触发。
    /// FIFO 弹出，直到队列空、并发额度耗尽或退避窗口生效。
    fn pump(&self) {
        loop {
            let job = {
                let mut state = self.shared.state.lock();
                if state.pending.is_empty() {
                    return;
                }

                let now = Instant::now();
                if !state.backoff.allows(now) {
                    self.schedule_reattempt(&mut state, now);
                    return;
                }

                let permit = match self.shared.limiter.try_acquire() {
                    Ok(permit) => permit,
                    // 并发额度耗尽：完成回调会重新触发 pump
                    Err(()) => return,
                };

                let request = match state.pending.pop_front() {
                    Some(request) => request,
                    None => return,
                };
                self.sync_backed_off(&mut state);
                (request, permit)
            };

            self.spawn_dispatch(job.0, job.1);
        }
    }

    /// 离线窗口内安排一次唤醒（只安排一个定时器）
    fn schedule_reattempt(&self, state: &mut QueueState, now: Instant) {
        if state.reattempt_scheduled {
            return;
        }
        state.reattempt_scheduled = true;
        let wake_at = state.backoff.next_allowed().unwrap_or(now);
        let queue = self.clone();
        self.shared.runtime.spawn(async move {
            tokio::time::sleep_until(tokio::time::Instant::from_std(wake_at)).await;
            queue.shared.state.lock().reattempt_scheduled = false;
            queue.pump();
        });
    }

    fn spawn_dispatch(&self, request: QueuedRequest, permit: OwnedSemaphorePermit) {
        let queue = self.clone();
        self.shared.runtime.spawn(async move {
            queue.shared.counters.queued_delta(-1);
            queue.shared.counters.inflight_delta(1);

            let result = queue.shared.dispatcher.dispatch(&request.spec).await;

            {
                let mut state = queue.shared.state.lock();
                let now = Instant::now();
                match result.code {
                    HttpQueueResultCode::Success => state.backoff.on_success(),
                    HttpQueueResultCode::Error => state.backoff.on_error(now),
                    HttpQueueResultCode::Timeout => state.backoff.on_timeout(now),
                    _ => {}
                }
                queue.sync_backed_off(&mut state);
            }

            queue.shared.counters.inflight_delta(-1);
            // 先归还并发额度再触发 admission
            drop(permit);

            // 回调恰好一次，在 I/O 完成上下文执行
            (request.callback)(result);
            queue.pump();
        });
    }

    /// 把 backed-off gauge 对齐到当前状态：离线时等于 pending 数，在线时为 0
    fn sync_backed_off(&self, state: &mut QueueState) {
        let target = if state.backoff.is_offline() {
            state.pending.len()
        } else {
            0
        };
        let delta = target as i64 - state.backed_off as i64;
        if delta != 0 {
            self.shared.counters.backed_off_delta(delta);
            state.backed_off = target;
        }
    }

    /// 排队超时清理：从队头弹出超龄的 pending 请求并以 Timeout 回调。
    /// 独立于 admission 循环，离线期间同样生效。
    fn expire_overdue(&self) {
        let timeout = self.shared.config.queue_timeout();
        let expired: Vec<QueuedRequest> = {
            let mut state = self.shared.state.lock();
            let now = Instant::now();
            let mut expired = Vec::new();
            // FIFO：队头最老，遇到未超时的即可停止
            loop {
                let overdue = match state.pending.front() {
                    Some(front) => now.duration_since(front.enqueued_at) >= timeout,
                    None => false,
                };
                if !overdue {
                    break;
                }
                if let Some(request) = state.pending.pop_front() {
                    expired.push(request);
                }
            }
            if !expired.is_empty() {
                self.sync_backed_off(&mut state);
            }
            expired
        };

        for request in expired {
            let age = request.enqueued_at.elapsed();
            self.shared.counters.queued_delta(-1);
            self.shared.counters.on_timeout();
            warn!(
                queue = %self.shared.name,
                age_ms = age.as_millis() as u64,
                "pending request expired in queue"
            );
            (request.callback)(HttpQueueResult::timeout(
                "request timed out while waiting in queue".to_string(),
                age,
            ));
        }
    }
}
