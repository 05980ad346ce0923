use std::error::Error as StdError;
use std::fmt;

/// 出站 HTTP 子系统错误类型
#[derive(Debug, Clone)]
pub enum RelayError {
    /// 验证错误（请求未入队即被拒绝）
    Validation(String),
    /// 传输错误（连接/DNS/协议失败）
    Transport(String),
    /// 超时错误（单次请求或排队超时）
    Timeout(String),
    /// 队列已满
    QueueFull(String),
    /// 远端被标记为离线
    Offline(String),
    /// 响应格式错误（空响应体/JSON 解析失败）
    ResponseFormat(String),
    /// 配置错误
    Configuration(String),
    /// 内部错误
    Internal(String),
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::Validation(msg) => write!(f, "Validation error: {}", msg),
            RelayError::Transport(msg) => write!(f, "Transport error: {}", msg),
            RelayError::Timeout(msg) => write!(f, "Timeout error: {}", msg),
            RelayError::QueueFull(msg) => write!(f, "Queue full: {}", msg),
            RelayError::Offline(msg) => write!(f, "Endpoint offline: {}", msg),
            RelayError::ResponseFormat(msg) => write!(f, "Response format error: {}", msg),
            RelayError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            RelayError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl StdError for RelayError {}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::ResponseFormat(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for RelayError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        RelayError::Timeout(err.to_string())
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, RelayError>;
