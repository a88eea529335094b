use crate::model::{Credentials, StreamEvent};
use anyhow::Result;
use futures::future::BoxFuture;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// What a connection should do after the provider announced a disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectDirective {
    /// End this connection cleanly so a fresh one can be opened.
    Reconnect,
    /// Give up on this connection and report it as failed.
    Stop,
}

/// Receive-path callbacks. Called from the connection task, so implementations must not block.
pub trait EventSink: Send + Sync {
    fn on_event(&self, event: StreamEvent);

    fn on_disconnect(&self, code: u16, reason: &str) -> DisconnectDirective;
}

/// The periodic maintenance hook a transport drives while its connection is live.
pub trait TermChecker: Send + Sync {
    /// Runs one maintenance pass and returns the currently enabled terms.
    fn tick(&self) -> BoxFuture<'_, Result<BTreeSet<String>>>;

    fn healthy(&self) -> bool;
}

/// Terms and credentials for one provider subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionRequest {
    pub terms: Vec<String>,
    pub credentials: Credentials,
}

/// Opens provider connections. The returned future runs the connection until it ends, feeding
/// `sink`, and must return promptly once `shutdown` is cancelled.
pub trait StreamConnector: Send + Sync + 'static {
    fn connect(
        &self,
        request: SubscriptionRequest,
        sink: Arc<dyn EventSink>,
        shutdown: CancellationToken,
    ) -> BoxFuture<'static, Result<()>>;
}

/// Starts and maintains a stream connection.
///
/// `maintain` returns `Ok(())` once `shutdown` is cancelled or `checker` reports unhealthy, and
/// `Err` for any failure the caller should count and retry.
pub trait StreamTransport: Send + Sync {
    fn maintain<'a>(
        &'a self,
        checker: &'a dyn TermChecker,
        shutdown: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<()>>;
}

/// Connection-level failures raised by connectors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    ConnectTimeout { addr: String },
    Disconnected { code: u16, reason: String },
}

impl fmt::Display for SubscriptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionError::ConnectTimeout { addr } => {
                write!(f, "timed out connecting to stream provider at {addr}")
            }
            SubscriptionError::Disconnected { code, reason } => {
                write!(f, "stream provider disconnected (code {code}): {reason}")
            }
        }
    }
}

impl std::error::Error for SubscriptionError {}
