pub mod model;
pub mod queue;
pub mod runtime;
pub mod storage;
pub mod stream;
pub mod supervisor;

pub use model::{
    Credentials, CredentialsError, FilterTerm, StatusRecord, StreamEvent, StreamStatus,
    WorkerStatus,
};
pub use queue::drain_queue::{DrainQueue, QueueEmpty};
pub use runtime::config::{WorkerConfig, WorkerConfigBuilder, WorkerConfigParams};
pub use runtime::runner::{RunOutcome, Runner};
pub use runtime::shutdown::{ShutdownSignal, ShutdownSignals, StopCause, StopSequence};
pub use runtime::status::StatusReporter;
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
pub use storage::{
    CredentialStore, EventStore, FileStore, MemoryStore, StatusStore, Stores, TermStore,
};
pub use stream::{
    DisconnectDirective, DriverOptions, DynamicStream, EventSink, HealthChecker, IngestListener,
    NdjsonConnector, StreamConnector, StreamTransport, SubscriptionError, SubscriptionRequest,
    TermChecker,
};
pub use supervisor::{StreamSupervisor, SupervisorExit};
