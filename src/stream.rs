//! Stream-facing half of the worker.
//!
//! - `transport`: the seams between this crate and a provider connection
//! - `listener`: receive-path callbacks plus batched persistence
//! - `checker`: the periodic tick (flush, term refresh, heartbeat) and health tracking
//! - `driver`: keeps a subscription matching the enabled terms while ticking the checker
//! - `ndjson`: newline-delimited JSON provider connection over TCP

pub mod checker;
pub mod driver;
pub mod listener;
pub mod ndjson;
pub mod transport;

pub use checker::HealthChecker;
pub use driver::{DriverOptions, DynamicStream};
pub use listener::IngestListener;
pub use ndjson::NdjsonConnector;
pub use transport::{
    DisconnectDirective, EventSink, StreamConnector, StreamTransport, SubscriptionError,
    SubscriptionRequest, TermChecker,
};
