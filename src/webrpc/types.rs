use serde::{Deserialize, Serialize};
use serde_json::Value;

/// WebRPC 请求标志位
pub mod web_flags {
    /// 随请求体附带 AuthCookie
    pub const SEND_AUTH_COOKIE: u8 = 0x02;
}

/// 入站 WebRPC 操作（来自客户端 peer）
#[derive(Debug, Clone, Deserialize)]
pub struct WebRpcRequest {
    /// 目标路径；必填且非空
    #[serde(rename = "UriPath", default)]
    pub uri_path: String,
    /// 调用参数：map 或标量/数组，按双模式合并进请求体
    #[serde(rename = "RpcCallParams", default)]
    pub rpc_params: Option<Value>,
    /// 标志位（见 `web_flags`）
    #[serde(rename = "WebFlags", default)]
    pub web_flags: u8,
}

impl WebRpcRequest {
    pub fn new(uri_path: &str, rpc_params: Option<Value>) -> Self {
        Self {
            uri_path: uri_path.to_string(),
            rpc_params,
            web_flags: 0,
        }
    }

    pub fn with_flags(mut self, flags: u8) -> Self {
        self.web_flags = flags;
        self
    }

    #[inline]
    pub fn send_auth_cookie(&self) -> bool {
        self.web_flags & web_flags::SEND_AUTH_COOKIE != 0
    }
}

/// Webhook 返回的 JSON 响应体
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebRpcResponse {
    #[serde(rename = "ResultCode", default)]
    pub result_code: u8,
    #[serde(rename = "Message", default)]
    pub message: String,
    #[serde(rename = "Data", default)]
    pub data: Option<Value>,
}

/// 操作错误码（游戏操作边界的返回码）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationErrorCode {
    Ok = 0,
    /// 入站请求格式非法
    OperationInvalid = -2,
    /// HTTP/解析/超时/队列失败
    ExternalHttpCallFailed = -3,
}

impl OperationErrorCode {
    #[inline]
    pub fn code(&self) -> i16 {
        *self as i16
    }
}

/// 成功响应中回传给 peer 的 WebRPC 调用结果参数
#[derive(Debug, Clone, Serialize)]
pub struct WebRpcCallResult {
    #[serde(rename = "RpcCallRetCode")]
    pub ret_code: u8,
    #[serde(rename = "RpcCallRetMessage")]
    pub ret_message: String,
    /// 回显的路径，已去掉尾部 query
    #[serde(rename = "UriPath")]
    pub uri_path: String,
    #[serde(rename = "RpcCallParams", skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// 回给 peer 的操作响应
///
/// 每次调用恰好产生一个；code == 0 永远表示 success。
#[derive(Debug, Clone)]
pub struct OperationResponse {
    pub return_code: i16,
    pub debug_message: Option<String>,
    pub parameters: Option<WebRpcCallResult>,
}

impl OperationResponse {
    /// 创建成功响应
    pub fn success(parameters: WebRpcCallResult, debug_message: Option<String>) -> Self {
        Self {
            return_code: OperationErrorCode::Ok.code(),
            debug_message,
            parameters: Some(parameters),
        }
    }

    /// 创建错误响应
    pub fn error(code: OperationErrorCode, message: impl Into<String>) -> Self {
        Self {
            return_code: code.code(),
            debug_message: Some(message.into()),
            parameters: None,
        }
    }

    #[inline]
    pub fn is_ok(&self) -> bool {
        self.return_code == 0
    }
}
