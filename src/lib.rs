#![allow(dead_code)]

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod queue;
pub mod webrpc;

pub use config::{HttpQueueConfig, WebRpcConfig, WebRpcEnvironment};
pub use error::{RelayError, Result};
pub use queue::{
    counters::{AppCallCounters, CountersPair, NoopAppCallCounters, QueueCountersRegistry},
    request::{HttpQueueResult, HttpQueueResultCode, HttpRequestSpec},
    RequestQueue,
};
pub use webrpc::{
    forwarder::WebRpcForwarder,
    manager::WebRpcManager,
    types::{OperationErrorCode, OperationResponse, WebRpcRequest, WebRpcResponse},
};
