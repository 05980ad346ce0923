//! Prometheus 指标：出站 HTTP 队列深度、并发数、成功/失败/超时计数等
//!
//! 通过 `init()` 安装全局 Recorder，`render_metrics()` 渲染抓取文本。
//! 各队列指标带 `queue` 标签，聚合实例使用 `_Total` 标签值。

use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::OnceLock;

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// 聚合实例的 queue 标签值
pub const TOTAL_INSTANCE: &str = "_Total";

/// 指标名称
pub const COUNTER_REQUESTS_ENQUEUED: &str = "webrelay_http_requests_enqueued_total";
pub const COUNTER_RESPONSES_RECEIVED: &str = "webrelay_http_responses_received_total";
pub const COUNTER_REQUESTS_SUCCESS: &str = "webrelay_http_requests_success_total";
pub const COUNTER_REQUESTS_ERROR: &str = "webrelay_http_requests_error_total";
pub const COUNTER_REQUESTS_TIMEOUT: &str = "webrelay_http_requests_timeout_total";
pub const COUNTER_QUEUE_FULL_REJECTS: &str = "webrelay_http_queue_full_rejects_total";
pub const COUNTER_OFFLINE_REJECTS: &str = "webrelay_http_offline_rejects_total";
pub const GAUGE_REQUESTS_INFLIGHT: &str = "webrelay_http_requests_inflight";
pub const GAUGE_REQUESTS_QUEUED: &str = "webrelay_http_requests_queued";
pub const GAUGE_REQUESTS_BACKED_OFF: &str = "webrelay_http_requests_backed_off";
pub const HISTOGRAM_EXECUTION_SECONDS: &str = "webrelay_http_execution_seconds";

/// 初始化 Prometheus 指标（安装全局 Recorder，返回 Handle 用于 HTTP 暴露）。
/// 仅需在进程内调用一次；重复调用会返回 Err。
pub fn init() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;
    HANDLE
        .set(handle)
        .map_err(|_| "metrics already initialized")?;
    Ok(())
}

/// 是否已初始化
pub fn is_initialized() -> bool {
    HANDLE.get().is_some()
}

/// 渲染当前指标为 Prometheus 文本格式，供抓取端点使用。
pub fn render_metrics() -> Option<String> {
    HANDLE.get().map(|h| h.render())
}
