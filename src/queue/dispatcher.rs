//! 单次 HTTP 调用的执行与结果归类
//!
//! `HttpTransport` 是唯一触网的接口：生产环境由 `ReqwestTransport`
//! 实现，测试使用脚本化的 mock。`Dispatcher` 负责超时/响应体上限
//! 的执行语义，并把传输结果归类为队列终态、记录计数器。

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tracing::{debug, warn};

use crate::config::HttpQueueConfig;
use crate::error::{RelayError, Result};
use crate::queue::counters::{AppCallCounters, CountersPair};
use crate::queue::request::{HttpQueueResult, HttpRequestSpec};

/// 传输层失败归类
#[derive(Debug, Clone)]
pub enum TransportFailure {
    /// 请求超时（硬超时到期）
    Timeout(String),
    /// 连接/DNS/协议失败
    Connect(String),
    /// 响应体超过大小上限
    Oversized(usize),
}

/// 传输层成功响应
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Bytes,
}

/// HTTP 传输接口
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// 执行一次请求；响应体读取不得超过 `max_response_size` 字节
    async fn execute(
        &self,
        spec: &HttpRequestSpec,
        max_response_size: usize,
    ) -> std::result::Result<TransportResponse, TransportFailure>;
}

/// 基于 reqwest 的生产传输实现（不走代理）
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .map_err(|e| RelayError::Configuration(format!("failed to build http client: {}", e)))?;
        Ok(Self { client })
    }

    fn classify(err: reqwest::Error) -> TransportFailure {
        if err.is_timeout() {
            TransportFailure::Timeout(err.to_string())
        } else {
            TransportFailure::Connect(err.to_string())
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(
        &self,
        spec: &HttpRequestSpec,
        max_response_size: usize,
    ) -> std::result::Result<TransportResponse, TransportFailure> {
        let mut builder = self
            .client
            .request(spec.method.clone(), &spec.url)
            .timeout(spec.timeout)
            .body(spec.body.clone());

        for (name, value) in &spec.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let mut response = builder.send().await.map_err(Self::classify)?;
        let status = response.status().as_u16();

        // 声明长度已超限的直接拒绝，不读任何字节
        if let Some(len) = response.content_length() {
            if len as usize > max_response_size {
                return Err(TransportFailure::Oversized(max_response_size));
            }
        }

        // 分块读取，累计超限即中止，避免无界缓冲
        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(Self::classify)? {
            if body.len() + chunk.len() > max_response_size {
                return Err(TransportFailure::Oversized(max_response_size));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(TransportResponse {
            status,
            body: body.freeze(),
        })
    }
}

/// 请求执行器：驱动传输、归类结果并上报计数器
pub struct Dispatcher {
    transport: Arc<dyn HttpTransport>,
    response_max_size: usize,
    counters: CountersPair,
    app_counters: Arc<dyn AppCallCounters>,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        config: &HttpQueueConfig,
        counters: CountersPair,
        app_counters: Arc<dyn AppCallCounters>,
    ) -> Self {
        Self {
            transport,
            response_max_size: config.response_max_size_limit,
            counters,
            app_counters,
        }
    }

    /// 执行一次请求并返回终态；每条路径恰好上报一次
    pub async fn dispatch(&self, spec: &HttpRequestSpec) -> HttpQueueResult {
        let started = Instant::now();
        let outcome = self.transport.execute(spec, self.response_max_size).await;
        let elapsed = started.elapsed();

        self.counters.add_execution_time(elapsed);

        match outcome {
            Ok(response) if (200..300).contains(&response.status) => {
                self.counters.on_response_received();
                self.counters.on_success();
                self.app_counters.on_success(elapsed);
                debug!(
                    url = %spec.url,
                    status = response.status,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "http request succeeded"
                );
                HttpQueueResult::success(response.status, response.body, elapsed)
            }
            Ok(response) => {
                self.counters.on_response_received();
                self.counters.on_error();
                self.app_counters.on_error();
                warn!(url = %spec.url, status = response.status, "http request returned non-2xx");
                HttpQueueResult::error(
                    Some(response.status),
                    format!("unexpected http status {}", response.status),
                    response.body,
                    elapsed,
                )
            }
            Err(TransportFailure::Timeout(msg)) => {
                self.counters.on_timeout();
                self.app_counters.on_timeout();
                warn!(url = %spec.url, error = %msg, "http request timed out");
                HttpQueueResult::timeout(msg, elapsed)
            }
            Err(TransportFailure::Oversized(limit)) => {
                self.counters.on_error();
                self.app_counters.on_error();
                warn!(url = %spec.url, limit, "http response exceeded size limit");
                HttpQueueResult::error(
                    None,
                    format!("response exceeded size limit of {} bytes", limit),
                    Bytes::new(),
                    elapsed,
                )
            }
            Err(TransportFailure::Connect(msg)) => {
                self.counters.on_error();
                self.app_counters.on_error();
                warn!(url = %spec.url, error = %msg, "http request failed");
                HttpQueueResult::error(None, msg, Bytes::new(), elapsed)
            }
        }
    }
}
