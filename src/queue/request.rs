use std::time::{Duration, Instant};

use bytes::Bytes;

/// 请求完成回调：每个请求恰好触发一次
pub type HttpRequestCallback = Box<dyn FnOnce(HttpQueueResult) + Send + 'static>;

/// 出站 HTTP 请求描述
#[derive(Debug, Clone)]
pub struct HttpRequestSpec {
    pub method: reqwest::Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    /// 单次请求超时（硬上限）
    pub timeout: Duration,
}

impl HttpRequestSpec {
    /// JSON POST 请求（Webhook/WebRPC 的标准形态）
    pub fn post_json(url: String, body: Bytes, timeout: Duration) -> Self {
        Self {
            method: reqwest::Method::POST,
            url,
            headers: vec![
                ("Content-Type".to_string(), "application/json".to_string()),
                ("Accept".to_string(), "application/json".to_string()),
            ],
            body,
            timeout,
        }
    }
}

/// 入队后的请求：从入队到回调触发由队列独占持有
pub struct QueuedRequest {
    pub spec: HttpRequestSpec,
    pub callback: HttpRequestCallback,
    pub enqueued_at: Instant,
}

/// 请求的终态结果码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpQueueResultCode {
    Success,
    Error,
    Timeout,
    QueueFull,
    Offline,
}

impl HttpQueueResultCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpQueueResultCode::Success => "Success",
            HttpQueueResultCode::Error => "Error",
            HttpQueueResultCode::Timeout => "Timeout",
            HttpQueueResultCode::QueueFull => "QueueFull",
            HttpQueueResultCode::Offline => "Offline",
        }
    }
}

/// 请求的终态：结果码 + HTTP 状态 + 响应体 + 错误信息 + 执行耗时
#[derive(Debug, Clone)]
pub struct HttpQueueResult {
    pub code: HttpQueueResultCode,
    pub status: Option<u16>,
    pub body: Bytes,
    pub error: Option<String>,
    pub elapsed: Duration,
}

impl HttpQueueResult {
    pub fn success(status: u16, body: Bytes, elapsed: Duration) -> Self {
        Self {
            code: HttpQueueResultCode::Success,
            status: Some(status),
            body,
            error: None,
            elapsed,
        }
    }

    pub fn error(status: Option<u16>, message: String, body: Bytes, elapsed: Duration) -> Self {
        Self {
            code: HttpQueueResultCode::Error,
            status,
            body,
            error: Some(message),
            elapsed,
        }
    }

    pub fn timeout(message: String, elapsed: Duration) -> Self {
        Self {
            code: HttpQueueResultCode::Timeout,
            status: None,
            body: Bytes::new(),
            error: Some(message),
            elapsed,
        }
    }

    pub fn queue_full() -> Self {
        Self {
            code: HttpQueueResultCode::QueueFull,
            status: None,
            body: Bytes::new(),
            error: Some("request queue is full".to_string()),
            elapsed: Duration::ZERO,
        }
    }

    pub fn offline() -> Self {
        Self {
            code: HttpQueueResultCode::Offline,
            status: None,
            body: Bytes::new(),
            error: Some("endpoint is offline and queue is full".to_string()),
            elapsed: Duration::ZERO,
        }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        self.code == HttpQueueResultCode::Success
    }
}
