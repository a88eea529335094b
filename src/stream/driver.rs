use super::transport::{
    EventSink, StreamConnector, StreamTransport, SubscriptionRequest, TermChecker,
};
use crate::model::Credentials;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;

/// How long a cancelled subscription gets to wind down before it is aborted.
const SUBSCRIPTION_STOP_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
pub struct DriverOptions {
    pub poll_interval: Duration,
    pub min_poll_sleep: Duration,
}

/// Keeps one provider subscription matching the enabled terms and ticks the checker on a fixed
/// poll interval while it runs.
pub struct DynamicStream {
    connector: Arc<dyn StreamConnector>,
    sink: Arc<dyn EventSink>,
    credentials: Credentials,
    options: DriverOptions,
}

struct Subscription {
    terms: BTreeSet<String>,
    token: CancellationToken,
    handle: JoinHandle<Result<()>>,
}

impl Subscription {
    fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    async fn join(self) -> Result<()> {
        self.handle.await.context("subscription task panicked")?
    }

    async fn stop(mut self) {
        self.token.cancel();
        let outcome = match timeout(SUBSCRIPTION_STOP_GRACE, &mut self.handle).await {
            Ok(joined) => joined.context("subscription task panicked"),
            Err(_) => {
                tracing::warn!(
                    target: "termstream::driver",
                    terms = self.terms.len(),
                    "subscription ignored cancellation; aborting"
                );
                self.handle.abort();
                return;
            }
        };
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) | Err(err) => tracing::debug!(
                target: "termstream::driver",
                error = %format!("{err:#}"),
                "subscription ended with error while stopping"
            ),
        }
    }
}

impl DynamicStream {
    pub fn new(
        connector: Arc<dyn StreamConnector>,
        sink: Arc<dyn EventSink>,
        credentials: Credentials,
        options: DriverOptions,
    ) -> Self {
        Self {
            connector,
            sink,
            credentials,
            options,
        }
    }

    async fn run(&self, checker: &dyn TermChecker, shutdown: &CancellationToken) -> Result<()> {
        // Tracked terms start empty on every entry so a retry always resubscribes.
        let mut live: Option<Subscription> = None;
        let result = self.poll_loop(checker, shutdown, &mut live).await;
        if let Some(subscription) = live.take() {
            subscription.stop().await;
        }
        result
    }

    async fn poll_loop(
        &self,
        checker: &dyn TermChecker,
        shutdown: &CancellationToken,
        live: &mut Option<Subscription>,
    ) -> Result<()> {
        let mut tracked: BTreeSet<String> = BTreeSet::new();

        loop {
            if shutdown.is_cancelled() || !checker.healthy() {
                return Ok(());
            }
            let started = Instant::now();

            if live.as_ref().is_some_and(Subscription::is_finished) {
                if let Some(finished) = live.take() {
                    finished.join().await?;
                    tracing::warn!(
                        target: "termstream::driver",
                        "stream connection ended; restarting subscription"
                    );
                }
            }

            let terms = checker.tick().await?;

            if terms != tracked || (live.is_none() && !terms.is_empty()) {
                if let Some(previous) = live.take() {
                    previous.stop().await;
                }
                if !terms.is_empty() {
                    tracing::info!(
                        target: "termstream::driver",
                        terms = ?terms,
                        "subscribing to terms"
                    );
                    *live = Some(self.subscribe(terms.clone(), shutdown));
                } else {
                    tracing::info!(
                        target: "termstream::driver",
                        "no enabled terms; waiting"
                    );
                }
                tracked = terms;
            }

            let delay = self
                .options
                .poll_interval
                .saturating_sub(started.elapsed())
                .max(self.options.min_poll_sleep);
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = sleep(delay) => {}
            }
        }
    }

    fn subscribe(&self, terms: BTreeSet<String>, shutdown: &CancellationToken) -> Subscription {
        let token = shutdown.child_token();
        let request = SubscriptionRequest {
            terms: terms.iter().cloned().collect(),
            credentials: self.credentials.clone(),
        };
        let handle = tokio::spawn(
            self.connector
                .connect(request, self.sink.clone(), token.clone()),
        );
        Subscription {
            terms,
            token,
            handle,
        }
    }
}

impl StreamTransport for DynamicStream {
    fn maintain<'a>(
        &'a self,
        checker: &'a dyn TermChecker,
        shutdown: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.run(checker, shutdown))
    }
}
