use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// 出站 HTTP 请求队列配置
///
/// 所有时间单位为毫秒、大小单位为字节。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpQueueConfig {
    /// 连续错误阈值：达到后队列进入离线状态
    pub max_error_requests: u32,
    /// 连续超时阈值：达到后队列进入离线状态
    pub max_timed_out_requests: u32,
    /// 离线后的首次重连间隔（毫秒）
    pub reconnect_interval_ms: u64,
    /// 请求在队列中的最长停留时间（毫秒），从入队时刻起算
    pub queue_timeout_ms: u64,
    /// 队列容量（排队中 + 执行中）
    pub max_queued_requests: usize,
    /// 离线重连间隔上限（毫秒）
    pub max_backoff_ms: u64,
    /// 同时执行的 HTTP 请求上限
    pub max_concurrent_requests: usize,
    /// 响应体大小上限（字节），超过按错误处理
    pub response_max_size_limit: usize,
    /// 单次 HTTP 请求超时（毫秒）
    pub http_request_timeout_ms: u64,
}

impl Default for HttpQueueConfig {
    fn default() -> Self {
        Self {
            max_error_requests: 30,
            max_timed_out_requests: 30,
            reconnect_interval_ms: 60_000,
            queue_timeout_ms: 30_000,
            max_queued_requests: 5_000,
            max_backoff_ms: 10_000,
            max_concurrent_requests: 1,
            response_max_size_limit: 4 * 1024 * 1024,
            http_request_timeout_ms: 10_000,
        }
    }
}

impl HttpQueueConfig {
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn queue_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_timeout_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn http_request_timeout(&self) -> Duration {
        Duration::from_millis(self.http_request_timeout_ms)
    }

    /// 校验配置合法性
    pub fn validate(&self) -> Result<()> {
        if self.max_queued_requests == 0 {
            anyhow::bail!("max_queued_requests must be > 0");
        }
        if self.max_concurrent_requests == 0 {
            anyhow::bail!("max_concurrent_requests must be > 0");
        }
        if self.http_request_timeout_ms == 0 {
            anyhow::bail!("http_request_timeout_ms must be > 0");
        }
        Ok(())
    }
}

/// WebRPC 环境上下文
///
/// 在 forwarder 构造时捕获，之后不可变；每次调用使用其副本。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebRpcEnvironment {
    pub app_id: String,
    pub app_version: String,
    pub region: String,
    pub cloud: String,
}

impl WebRpcEnvironment {
    pub fn new(app_id: &str, app_version: &str, region: &str, cloud: &str) -> Self {
        Self {
            app_id: app_id.to_string(),
            app_version: app_version.to_string(),
            region: region.to_string(),
            cloud: cloud.to_string(),
        }
    }
}

/// WebRPC 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebRpcConfig {
    /// 是否启用 WebRPC
    pub enabled: bool,
    /// Webhook 基础 URL（自身可携带 ?query）
    pub base_url: String,
    /// 出站 HTTP 队列调优参数
    pub queue: HttpQueueConfig,
}

impl Default for WebRpcConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: String::new(),
            queue: HttpQueueConfig::default(),
        }
    }
}

impl WebRpcConfig {
    /// 从 TOML 文件加载配置
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read config file: {:?}", path.as_ref()))?;

        let toml_config: TomlConfig =
            toml::from_str(&content).with_context(|| "invalid config file format")?;

        Ok(toml_config.into())
    }

    /// 从环境变量合并配置（WEBRELAY_ 前缀）
    pub fn merge_from_env(&mut self) {
        if let Ok(enabled) = env::var("WEBRELAY_WEBRPC_ENABLED") {
            self.enabled = enabled.parse().unwrap_or(self.enabled);
        }
        if let Ok(base_url) = env::var("WEBRELAY_WEBRPC_BASE_URL") {
            self.base_url = base_url;
        }
        if let Ok(timeout) = env::var("WEBRELAY_HTTP_REQUEST_TIMEOUT_MS") {
            self.queue.http_request_timeout_ms =
                timeout.parse().unwrap_or(self.queue.http_request_timeout_ms);
        }
        if let Ok(queued) = env::var("WEBRELAY_MAX_QUEUED_REQUESTS") {
            self.queue.max_queued_requests =
                queued.parse().unwrap_or(self.queue.max_queued_requests);
        }
        if let Ok(concurrent) = env::var("WEBRELAY_MAX_CONCURRENT_REQUESTS") {
            self.queue.max_concurrent_requests =
                concurrent.parse().unwrap_or(self.queue.max_concurrent_requests);
        }
    }

    /// 加载配置（按优先级：环境变量 > 配置文件 > 默认值）
    pub fn load(config_file: Option<&str>) -> Result<Self> {
        let mut config = if let Some(path) = config_file {
            if Path::new(path).exists() {
                info!("loading webrpc config from {}", path);
                Self::from_toml_file(path)?
            } else {
                tracing::warn!("config file not found: {}, using defaults", path);
                Self::default()
            }
        } else {
            Self::default()
        };

        config.merge_from_env();
        config.validate()?;
        Ok(config)
    }

    /// 校验配置合法性；启用时 base_url 必须是合法 URL
    pub fn validate(&self) -> Result<()> {
        self.queue.validate()?;
        if self.enabled {
            if self.base_url.is_empty() {
                anyhow::bail!("webrpc is enabled but base_url is empty");
            }
            // 占位符替换前先替换成合法字符做语法检查
            let probe = self
                .base_url
                .replace('{', "")
                .replace('}', "");
            url::Url::parse(&probe)
                .with_context(|| format!("invalid base_url: {}", self.base_url))?;
        }
        Ok(())
    }
}

/// TOML 配置文件结构（用于反序列化）
#[derive(Debug, Deserialize)]
struct TomlConfig {
    webrpc: Option<TomlWebRpcConfig>,
    queue: Option<TomlQueueConfig>,
}

#[derive(Debug, Deserialize)]
struct TomlWebRpcConfig {
    enabled: Option<bool>,
    base_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TomlQueueConfig {
    max_error_requests: Option<u32>,
    max_timed_out_requests: Option<u32>,
    reconnect_interval_ms: Option<u64>,
    queue_timeout_ms: Option<u64>,
    max_queued_requests: Option<usize>,
    max_backoff_ms: Option<u64>,
    max_concurrent_requests: Option<usize>,
    response_max_size_limit: Option<usize>,
    http_request_timeout_ms: Option<u64>,
}

impl From<TomlConfig> for WebRpcConfig {
    fn from(toml: TomlConfig) -> Self {
        let mut config = Self::default();

        if let Some(webrpc) = toml.webrpc {
            if let Some(enabled) = webrpc.enabled {
                config.enabled = enabled;
            }
            if let Some(base_url) = webrpc.base_url {
                config.base_url = base_url;
            }
        }

        if let Some(queue) = toml.queue {
            if let Some(v) = queue.max_error_requests {
                config.queue.max_error_requests = v;
            }
            if let Some(v) = queue.max_timed_out_requests {
                config.queue.max_timed_out_requests = v;
            }
            if let Some(v) = queue.reconnect_interval_ms {
                config.queue.reconnect_interval_ms = v;
            }
            if let Some(v) = queue.queue_timeout_ms {
                config.queue.queue_timeout_ms = v;
            }
            if let Some(v) = queue.max_queued_requests {
                config.queue.max_queued_requests = v;
            }
            if let Some(v) = queue.max_backoff_ms {
                config.queue.max_backoff_ms = v;
            }
            if let Some(v) = queue.max_concurrent_requests {
                config.queue.max_concurrent_requests = v;
            }
            if let Some(v) = queue.response_max_size_limit {
                config.queue.response_max_size_limit = v;
            }
            if let Some(v) = queue.http_request_timeout_ms {
                config.queue.http_request_timeout_ms = v;
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_queue_config_is_valid() {
        let config = HttpQueueConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.http_request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_toml_overrides() {
        let toml = r#"
            [webrpc]
            enabled = true
            base_url = "https://hooks.example.com/game?stage=prod"

            [queue]
            max_queued_requests = 10
            max_concurrent_requests = 4
        "#;
        let parsed: TomlConfig = toml::from_str(toml).unwrap();
        let config: WebRpcConfig = parsed.into();
        assert!(config.enabled);
        assert_eq!(config.queue.max_queued_requests, 10);
        assert_eq!(config.queue.max_concurrent_requests, 4);
        // 未覆盖的字段保持默认值
        assert_eq!(config.queue.max_error_requests, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_enabled_requires_base_url() {
        let config = WebRpcConfig {
            enabled: true,
            base_url: String::new(),
            queue: HttpQueueConfig::default(),
        };
        assert!(config.validate().is_err());
    }
}
