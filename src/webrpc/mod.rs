pub mod forwarder;
pub mod manager;
pub mod types;

pub use forwarder::WebRpcForwarder;
pub use manager::WebRpcManager;
pub use types::{
    web_flags, OperationErrorCode, OperationResponse, WebRpcCallResult, WebRpcRequest,
    WebRpcResponse,
};
