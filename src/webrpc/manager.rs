//! WebRPC 管理器
//!
//! 持有整个 WebRPC 子系统的生命周期：配置校验、出站请求队列的
//! 创建与启动、forwarder 的派发以及优雅关闭。禁用时所有入口
//! 退化为 no-op（`get_forwarder` 返回 None）。

use std::sync::Arc;

use tracing::info;

use crate::config::{WebRpcConfig, WebRpcEnvironment};
use crate::error::{RelayError, Result};
use crate::queue::counters::{AppCallCounters, QueueCountersRegistry};
use crate::queue::dispatcher::{HttpTransport, ReqwestTransport};
use crate::queue::RequestQueue;
use crate::webrpc::forwarder::WebRpcForwarder;

/// WebRPC 子系统入口
pub struct WebRpcManager {
    config: WebRpcConfig,
    environment: WebRpcEnvironment,
    queue: Option<RequestQueue>,
}

impl WebRpcManager {
    /// 创建并启动 WebRPC 子系统。
    ///
    /// 必须在 tokio runtime 上下文内调用。配置非法时返回错误；
    /// `enabled = false` 时不创建队列，后续 `get_forwarder` 返回 None。
    pub fn new(
        config: WebRpcConfig,
        environment: WebRpcEnvironment,
        registry: &QueueCountersRegistry,
        app_counters: Arc<dyn AppCallCounters>,
    ) -> Result<Self> {
        if config.enabled {
            let transport = Arc::new(ReqwestTransport::new()?);
            Self::with_transport(config, environment, transport, registry, app_counters)
        } else {
            config
                .validate()
                .map_err(|e| RelayError::Configuration(e.to_string()))?;
            info!("webrpc disabled");
            Ok(Self {
                config,
                environment,
                queue: None,
            })
        }
    }

    /// 用自定义传输创建（测试注入 mock 传输时使用）
    pub fn with_transport(
        config: WebRpcConfig,
        environment: WebRpcEnvironment,
        transport: Arc<dyn HttpTransport>,
        registry: &QueueCountersRegistry,
        app_counters: Arc<dyn AppCallCounters>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| RelayError::Configuration(e.to_string()))?;

        let queue = if config.enabled {
            let queue = RequestQueue::new(
                "webrpc",
                config.queue.clone(),
                transport,
                registry,
                app_counters,
            );
            queue.start();
            info!(base_url = %config.base_url, "webrpc enabled");
            Some(queue)
        } else {
            info!("webrpc disabled");
            None
        };

        Ok(Self {
            config,
            environment,
            queue,
        })
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.queue.is_some()
    }

    /// 获取 forwarder；禁用时返回 None
    pub fn get_forwarder(&self) -> Option<WebRpcForwarder> {
        self.queue.as_ref().map(|queue| {
            WebRpcForwarder::new(
                queue.clone(),
                self.config.base_url.clone(),
                self.environment.clone(),
                self.config.queue.http_request_timeout(),
            )
        })
    }

    /// 关闭子系统：排队中的请求以终态回调，后续入队被拒绝
    pub fn shutdown(&self) {
        if let Some(queue) = &self.queue {
            queue.shutdown();
        }
    }
}
