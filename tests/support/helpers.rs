use std::{
    future::Future,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::{anyhow, bail, Result};
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use serde_json::Value;
use termstream::{
    Credentials, EventSink, ShutdownSignal, StreamConnector, StreamEvent, SubscriptionRequest,
};
use tokio::sync::oneshot;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

static TRACING_SUBSCRIBER: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING_SUBSCRIBER);
}

pub fn credentials(name: &str) -> Credentials {
    Credentials {
        name: name.to_owned(),
        api_key: format!("{name}-key"),
        api_secret: format!("{name}-secret"),
        access_token: format!("{name}-token"),
        access_token_secret: format!("{name}-token-secret"),
    }
}

/// A signal source the test fires by hand.
pub fn manual_signal() -> (
    oneshot::Sender<ShutdownSignal>,
    impl Future<Output = Result<ShutdownSignal>>,
) {
    let (tx, rx) = oneshot::channel();
    let signal = async move {
        rx.await
            .map_err(|_| anyhow!("signal sender dropped before firing"))
    };
    (tx, signal)
}

/// Polls `condition` until it holds or `limit` elapses.
pub async fn wait_until<F>(limit: Duration, mut condition: F) -> Result<()>
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + limit;
    while !condition() {
        if Instant::now() >= deadline {
            bail!("condition not met within {limit:?}");
        }
        sleep(Duration::from_millis(20)).await;
    }
    Ok(())
}

/// Every connection attempt fails immediately.
#[derive(Default)]
pub struct FailingConnector {
    attempts: AtomicUsize,
}

impl FailingConnector {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl StreamConnector for FailingConnector {
    fn connect(
        &self,
        _request: SubscriptionRequest,
        _sink: Arc<dyn EventSink>,
        _shutdown: CancellationToken,
    ) -> BoxFuture<'static, Result<()>> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        Box::pin(async move { Err::<(), _>(anyhow!("connection refused (attempt {attempt})")) })
    }
}

/// Delivers a fixed set of events on every connection, then idles until cancelled.
pub struct ScriptedConnector {
    events: Vec<Value>,
    connections: AtomicUsize,
}

impl ScriptedConnector {
    pub fn new(events: Vec<Value>) -> Self {
        Self {
            events,
            connections: AtomicUsize::new(0),
        }
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

impl StreamConnector for ScriptedConnector {
    fn connect(
        &self,
        _request: SubscriptionRequest,
        sink: Arc<dyn EventSink>,
        shutdown: CancellationToken,
    ) -> BoxFuture<'static, Result<()>> {
        self.connections.fetch_add(1, Ordering::SeqCst);
        let events = self.events.clone();
        Box::pin(async move {
            for payload in events {
                sink.on_event(StreamEvent::new(payload));
            }
            shutdown.cancelled().await;
            Ok(())
        })
    }
}
