//! 出站请求全局并发限流器
//!
//! 限制同时在途的 HTTP 请求数量，permit 随 dispatch 任务存活，
//! 任务结束自动归还。admission 循环只做非阻塞获取。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// 在途请求并发限流器
#[derive(Clone)]
pub struct ConcurrencyLimiter {
    sem: Arc<Semaphore>,
    max_inflight: usize,
    /// try_acquire 失败计数
    rejected_count: Arc<AtomicU64>,
}

impl ConcurrencyLimiter {
    pub fn new(max_inflight: usize) -> Self {
        Self {
            sem: Arc::new(Semaphore::new(max_inflight)),
            max_inflight,
            rejected_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 尝试获取 permit（非阻塞）。
    /// 成功返回 Ok(permit)，失败返回 Err(()) 并自增 rejected 计数。
    pub fn try_acquire(&self) -> Result<OwnedSemaphorePermit, ()> {
        match self.sem.clone().try_acquire_owned() {
            Ok(permit) => Ok(permit),
            Err(_) => {
                self.rejected_count.fetch_add(1, Ordering::Relaxed);
                Err(())
            }
        }
    }

    /// 当前在途请求数量
    pub fn inflight(&self) -> usize {
        self.max_inflight - self.sem.available_permits()
    }

    /// 剩余可用 permit 数
    pub fn available_permits(&self) -> usize {
        self.sem.available_permits()
    }

    /// 累计被并发上限挡下的获取次数
    pub fn rejected_total(&self) -> u64 {
        self.rejected_count.load(Ordering::Relaxed)
    }

    /// 最大并发数配置
    pub fn max_inflight(&self) -> usize {
        self.max_inflight
    }
}
