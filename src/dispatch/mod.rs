//! Probe dispatch: concurrency, rate limiting, retries and endpoint rotation

mod endpoints;
mod engine;
mod rate;
mod retry;
mod transport;

pub use endpoints::{Endpoint, EndpointPool, EndpointSpec, Selection};
pub use engine::{Completed, DispatchConfig, DispatchStats, Dispatcher, StopHandle};
pub use rate::RateGate;
pub use retry::RetryPolicy;
pub use transport::{ReqwestTransport, Transport, TransportConfig};
