//! WebRPC Forwarder
//!
//! 职责：
//! - 校验入站 WebRpc 操作（非法请求不入队，同步回 OperationInvalid）
//! - 从配置的 base URL 和环境上下文构造目标 URL（占位符替换）
//! - 双模式合并请求体（map 参数平铺 / 非 map 包裹到 RpcParams）
//! - 通过 RequestQueue 发出 JSON POST
//! - 把队列终态映射为恰好一个操作响应；任何失败都不会越过
//!   dispatch 边界抛出，也不会漏掉回调

use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::WebRpcEnvironment;
use crate::queue::request::{HttpQueueResult, HttpQueueResultCode, HttpRequestSpec};
use crate::queue::RequestQueue;
use crate::webrpc::types::{
    OperationErrorCode, OperationResponse, WebRpcCallResult, WebRpcRequest, WebRpcResponse,
};

/// 诊断消息中响应体片段的最大长度（字符）
const BODY_EXCERPT_LIMIT: usize = 200;

/// WebRPC → HTTP 转发器；Clone 共享同一队列
#[derive(Clone)]
pub struct WebRpcForwarder {
    queue: RequestQueue,
    base_url: String,
    environment: WebRpcEnvironment,
    request_timeout: Duration,
}

impl WebRpcForwarder {
    pub(crate) fn new(
        queue: RequestQueue,
        base_url: String,
        environment: WebRpcEnvironment,
        request_timeout: Duration,
    ) -> Self {
        Self {
            queue,
            base_url,
            environment,
            request_timeout,
        }
    }

    /// 处理一次 WebRpc 调用。
    ///
    /// 返回 true 表示已入队；false 表示请求非法，`on_response` 已同步
    /// 收到 OperationInvalid。无论哪条路径，`on_response` 恰好触发一次。
    pub fn handle_call<F>(
        &self,
        user_id: &str,
        request: WebRpcRequest,
        auth_cookie: Option<Value>,
        on_response: F,
    ) -> bool
    where
        F: FnOnce(OperationResponse) + Send + 'static,
    {
        if request.uri_path.trim().is_empty() {
            warn!(user_id, "webrpc call rejected: missing uri path");
            on_response(OperationResponse::error(
                OperationErrorCode::OperationInvalid,
                "webrpc request is missing a uri path",
            ));
            return false;
        }

        let url = self.build_url(&request.uri_path);
        let body = self.build_body(user_id, &request, auth_cookie);
        let body_bytes = match serde_json::to_vec(&body) {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) => {
                warn!(user_id, error = %e, "failed to serialize webrpc body");
                on_response(OperationResponse::error(
                    OperationErrorCode::ExternalHttpCallFailed,
                    format!("failed to serialize rpc body: {}", e),
                ));
                return false;
            }
        };

        debug!(user_id, url = %url, "forwarding webrpc call");
        let spec = HttpRequestSpec::post_json(url.clone(), body_bytes, self.request_timeout);
        let uri_path = request.uri_path.clone();
        self.queue.enqueue(spec, move |result| {
            on_response(map_response(&url, &uri_path, result));
        });
        true
    }

    /// 构造目标 URL：base 在首个 `?` 处拆成 base/tail，
    /// 最终 URL = base + "/" + uri_path + 分隔符 + tail，
    /// 再独立替换 {AppId}/{AppVersion}/{Region}/{Cloud} 四个占位符。
    fn build_url(&self, uri_path: &str) -> String {
        let (base, tail) = match self.base_url.find('?') {
            Some(idx) => (&self.base_url[..idx], &self.base_url[idx + 1..]),
            None => (self.base_url.as_str(), ""),
        };

        let mut url = format!("{}/{}", base, uri_path);
        if !tail.is_empty() {
            url.push(if uri_path.contains('?') { '&' } else { '?' });
            url.push_str(tail);
        }

        url.replace("{AppId}", &strip_spaces(&self.environment.app_id))
            .replace("{AppVersion}", &strip_spaces(&self.environment.app_version))
            .replace("{Region}", &strip_spaces(&self.environment.region))
            .replace("{Cloud}", &strip_spaces(&self.environment.cloud))
    }

    /// 双模式请求体合并。
    ///
    /// 参数本身是 map：固定字段作为顶层兄弟键插入该 map 的副本；
    /// 否则新建包装 map，参数非空时放入 `RpcParams` 键。
    /// 合并永远发生在每次调用的副本上，不回写共享环境。
    fn build_body(
        &self,
        user_id: &str,
        request: &WebRpcRequest,
        auth_cookie: Option<Value>,
    ) -> Value {
        let mut map = match &request.rpc_params {
            Some(Value::Object(params)) => params.clone(),
            other => {
                let mut wrapper = serde_json::Map::new();
                if let Some(params) = other {
                    if !params.is_null() {
                        wrapper.insert("RpcParams".to_string(), params.clone());
                    }
                }
                wrapper
            }
        };

        map.insert(
            "AppId".to_string(),
            Value::String(self.environment.app_id.clone()),
        );
        map.insert(
            "AppVersion".to_string(),
            Value::String(self.environment.app_version.clone()),
        );
        map.insert(
            "Region".to_string(),
            Value::String(self.environment.region.clone()),
        );
        map.insert("UserId".to_string(), Value::String(user_id.to_string()));

        if request.send_auth_cookie() {
            if let Some(cookie) = auth_cookie {
                map.insert("AuthCookie".to_string(), cookie);
            }
        }

        Value::Object(map)
    }
}

/// 把队列终态映射为操作响应。
///
/// 该函数是全函数（不会 panic）：响应处理中的任何失败都归结为
/// ExternalHttpCallFailed 的错误响应。
pub(crate) fn map_response(
    url: &str,
    uri_path: &str,
    result: HttpQueueResult,
) -> OperationResponse {
    if !result.is_success() {
        let message = format!(
            "webrpc call to '{}' failed: result={}, status={}, error={}",
            url,
            result.code.as_str(),
            result
                .status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string()),
            result.error.as_deref().unwrap_or("-"),
        );
        // QueueFull 属于高负载下的预期情形，低级别记录
        if result.code == HttpQueueResultCode::QueueFull {
            debug!(url, "webrpc queue full");
        } else {
            warn!(url, result = result.code.as_str(), "webrpc call failed");
        }
        return OperationResponse::error(OperationErrorCode::ExternalHttpCallFailed, message);
    }

    let text = String::from_utf8_lossy(&result.body);
    // 去掉 UTF-8 BOM / 零宽空格
    let text = text.trim_start_matches(|c| c == '\u{feff}' || c == '\u{200b}');

    if text.is_empty() {
        warn!(url, "webrpc response is empty");
        return OperationResponse::error(
            OperationErrorCode::ExternalHttpCallFailed,
            format!("webrpc response from '{}' is empty", url),
        );
    }

    let parsed: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            warn!(url, error = %e, "webrpc response is not valid json");
            return OperationResponse::error(
                OperationErrorCode::ExternalHttpCallFailed,
                format!(
                    "failed to parse webrpc response from '{}': {}; body: {}",
                    url,
                    e,
                    excerpt(text)
                ),
            );
        }
    };
    if parsed.is_null() {
        return OperationResponse::error(
            OperationErrorCode::ExternalHttpCallFailed,
            format!(
                "webrpc response from '{}' parsed to null; body: {}",
                url,
                excerpt(text)
            ),
        );
    }

    let rpc: WebRpcResponse = match serde_json::from_value(parsed) {
        Ok(rpc) => rpc,
        Err(e) => {
            return OperationResponse::error(
                OperationErrorCode::ExternalHttpCallFailed,
                format!(
                    "unexpected webrpc response shape from '{}': {}; body: {}",
                    url,
                    e,
                    excerpt(text)
                ),
            );
        }
    };

    // Data 仅在是非空集合时回传
    let data = rpc.data.filter(|d| match d {
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
        _ => false,
    });
    let debug_message = data
        .as_ref()
        .and_then(|d| serde_json::to_string(d).ok());

    let stripped_path = uri_path.split('?').next().unwrap_or(uri_path);
    OperationResponse::success(
        WebRpcCallResult {
            ret_code: rpc.result_code,
            ret_message: rpc.message,
            uri_path: stripped_path.to_string(),
            params: data,
        },
        debug_message,
    )
}

/// URL 占位符替换值：去掉所有空白字符
fn strip_spaces(value: &str) -> String {
    value.split_whitespace().collect()
}

/// 诊断消息中的响应体片段：最多 200 个字符，绝不携带完整响应体
fn excerpt(text: &str) -> &str {
    match text.char_indices().nth(BODY_EXCERPT_LIMIT) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpQueueConfig;
    use crate::queue::counters::{NoopAppCallCounters, QueueCountersRegistry};
    use crate::queue::dispatcher::{HttpTransport, TransportFailure, TransportResponse};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;

    struct EchoTransport;

    #[async_trait]
    impl HttpTransport for EchoTransport {
        async fn execute(
            &self,
            _spec: &HttpRequestSpec,
            _max_response_size: usize,
        ) -> Result<TransportResponse, TransportFailure> {
            Ok(TransportResponse {
                status: 200,
                body: Bytes::from_static(b"{\"ResultCode\":0,\"Message\":\"OK\"}"),
            })
        }
    }

    fn environment() -> WebRpcEnvironment {
        WebRpcEnvironment::new("  A 1 ", "1.0", "eu", "c")
    }

    fn forwarder_with_base(base_url: &str) -> WebRpcForwarder {
        let queue = RequestQueue::new(
            "webrpc",
            HttpQueueConfig::default(),
            Arc::new(EchoTransport),
            &QueueCountersRegistry::Disabled,
            Arc::new(NoopAppCallCounters),
        );
        WebRpcForwarder::new(
            queue,
            base_url.to_string(),
            environment(),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_url_templating_with_query_tail() {
        let forwarder = forwarder_with_base("http://x/y?k=v");
        assert_eq!(forwarder.build_url("Foo"), "http://x/y/Foo?k=v");
    }

    #[tokio::test]
    async fn test_url_templating_placeholders_stripped() {
        let forwarder = forwarder_with_base("http://x/{AppId}/{AppVersion}/{Region}/{Cloud}");
        assert_eq!(forwarder.build_url("Foo"), "http://x/A1/1.0/eu/c/Foo");
    }

    #[tokio::test]
    async fn test_url_templating_path_with_own_query() {
        let forwarder = forwarder_with_base("http://x/y?k=v");
        assert_eq!(forwarder.build_url("Foo?a=b"), "http://x/y/Foo?a=b&k=v");
    }

    #[tokio::test]
    async fn test_url_templating_no_tail() {
        let forwarder = forwarder_with_base("http://x/y");
        assert_eq!(forwarder.build_url("Foo"), "http://x/y/Foo");
    }

    #[tokio::test]
    async fn test_body_merge_map_params() {
        let forwarder = forwarder_with_base("http://x/y");
        let request = WebRpcRequest::new("Foo", Some(json!({"a": 1})));
        let body = forwarder.build_body("u1", &request, None);

        let map = body.as_object().expect("object body");
        assert_eq!(map["a"], json!(1));
        assert_eq!(map["AppId"], json!("  A 1 "));
        assert_eq!(map["AppVersion"], json!("1.0"));
        assert_eq!(map["Region"], json!("eu"));
        assert_eq!(map["UserId"], json!("u1"));
        assert!(!map.contains_key("RpcParams"));
        assert!(!map.contains_key("AuthCookie"));
    }

    #[tokio::test]
    async fn test_body_merge_non_map_params() {
        let forwarder = forwarder_with_base("http://x/y");
        let request = WebRpcRequest::new("Foo", Some(json!([1, 2, 3])));
        let body = forwarder.build_body("u1", &request, None);

        let map = body.as_object().expect("object body");
        assert_eq!(map["RpcParams"], json!([1, 2, 3]));
        assert_eq!(map["UserId"], json!("u1"));
        assert!(map.contains_key("AppId"));
        assert!(map.contains_key("AppVersion"));
        assert!(map.contains_key("Region"));
    }

    #[tokio::test]
    async fn test_body_merge_absent_params_has_no_rpc_params_key() {
        let forwarder = forwarder_with_base("http://x/y");
        let request = WebRpcRequest::new("Foo", None);
        let body = forwarder.build_body("u1", &request, None);
        assert!(!body.as_object().unwrap().contains_key("RpcParams"));
    }

    #[tokio::test]
    async fn test_body_merge_auth_cookie_flag() {
        let forwarder = forwarder_with_base("http://x/y");
        let request = WebRpcRequest::new("Foo", Some(json!({"a": 1})))
            .with_flags(crate::webrpc::types::web_flags::SEND_AUTH_COOKIE);
        let body = forwarder.build_body("u1", &request, Some(json!({"token": "t"})));
        assert_eq!(body["AuthCookie"], json!({"token": "t"}));

        // 无标志位时即便提供了 cookie 也不附带
        let request = WebRpcRequest::new("Foo", Some(json!({"a": 1})));
        let body = forwarder.build_body("u1", &request, Some(json!({"token": "t"})));
        assert!(!body.as_object().unwrap().contains_key("AuthCookie"));
    }

    #[tokio::test]
    async fn test_handle_call_rejects_empty_uri_path() {
        let forwarder = forwarder_with_base("http://x/y");
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let accepted = forwarder.handle_call(
            "u1",
            WebRpcRequest::new("  ", None),
            None,
            move |response| {
                let _ = tx.send(response);
            },
        );

        assert!(!accepted);
        let response = rx.recv().await.expect("synchronous response");
        assert_eq!(
            response.return_code,
            OperationErrorCode::OperationInvalid.code()
        );
    }

    #[test]
    fn test_map_response_success_with_data() {
        let result = HttpQueueResult::success(
            200,
            Bytes::from_static(
                b"\xef\xbb\xbf{\"ResultCode\":7,\"Message\":\"done\",\"Data\":{\"x\":1}}",
            ),
            Duration::from_millis(5),
        );
        let response = map_response("http://x/y/Foo?k=v", "Foo?tail=1", result);

        assert!(response.is_ok());
        let params = response.parameters.expect("parameters");
        assert_eq!(params.ret_code, 7);
        assert_eq!(params.ret_message, "done");
        assert_eq!(params.uri_path, "Foo");
        assert_eq!(params.params, Some(json!({"x": 1})));
        assert_eq!(response.debug_message.as_deref(), Some("{\"x\":1}"));
    }

    #[test]
    fn test_map_response_success_without_data() {
        let result = HttpQueueResult::success(
            200,
            Bytes::from_static(b"{\"ResultCode\":0,\"Message\":\"OK\",\"Data\":[]}"),
            Duration::from_millis(5),
        );
        let response = map_response("http://x/y/Foo", "Foo", result);

        assert!(response.is_ok());
        let params = response.parameters.expect("parameters");
        assert_eq!(params.params, None);
        assert_eq!(response.debug_message, None);
    }

    #[test]
    fn test_map_response_empty_body_is_error() {
        let result = HttpQueueResult::success(200, Bytes::new(), Duration::from_millis(5));
        let response = map_response("http://x/y/Foo", "Foo", result);

        assert_eq!(
            response.return_code,
            OperationErrorCode::ExternalHttpCallFailed.code()
        );
        assert!(response.debug_message.unwrap().contains("empty"));
    }

    #[test]
    fn test_map_response_garbled_body_is_error_with_excerpt() {
        let result = HttpQueueResult::success(
            200,
            Bytes::from_static(b"{not json"),
            Duration::from_millis(5),
        );
        let response = map_response("http://x/y/Foo", "Foo", result);

        assert_eq!(
            response.return_code,
            OperationErrorCode::ExternalHttpCallFailed.code()
        );
        assert!(response.debug_message.unwrap().contains("{not json"));
    }

    #[test]
    fn test_map_response_excerpt_is_bounded() {
        let big = format!("{{not json {}", "x".repeat(1000));
        let result = HttpQueueResult::success(
            200,
            Bytes::from(big),
            Duration::from_millis(5),
        );
        let response = map_response("http://x/y/Foo", "Foo", result);
        // 诊断消息包含片段而非完整响应体
        assert!(response.debug_message.unwrap().len() < 600);
    }

    #[test]
    fn test_map_response_queue_failures() {
        for result in [
            HttpQueueResult::queue_full(),
            HttpQueueResult::offline(),
            HttpQueueResult::timeout("deadline".to_string(), Duration::from_secs(10)),
            HttpQueueResult::error(
                Some(503),
                "service unavailable".to_string(),
                Bytes::new(),
                Duration::from_millis(5),
            ),
        ] {
            let response = map_response("http://x/y/Foo", "Foo", result);
            assert_eq!(
                response.return_code,
                OperationErrorCode::ExternalHttpCallFailed.code()
            );
            assert!(response.debug_message.unwrap().contains("http://x/y/Foo"));
        }
    }
}
