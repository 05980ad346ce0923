pub mod backoff;
pub mod counters;
pub mod dispatcher;
pub mod limiter;
pub mod request;
pub mod queue;

pub use backoff::BackoffController;
pub use counters::{
    AppCallCounters, CountersPair, NoopAppCallCounters, QueueCounters, QueueCountersRegistry,
};
pub use dispatcher::{Dispatcher, HttpTransport, ReqwestTransport, TransportFailure, TransportResponse};
pub use limiter::ConcurrencyLimiter;
pub use queue::{QueueStats, RequestQueue};
pub use request::{HttpQueueResult, HttpQueueResultCode, HttpRequestSpec, QueuedRequest};
