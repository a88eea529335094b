use crate::model::StreamEvent;
use crate::queue::drain_queue::DrainQueue;
use crate::runtime::config::WorkerConfig;
use crate::runtime::shutdown::{ShutdownSignal, ShutdownSignals, StopCause, StopSequence};
use crate::runtime::status::StatusReporter;
use crate::runtime::telemetry::Telemetry;
use crate::storage::Stores;
use crate::stream::{DriverOptions, DynamicStream, HealthChecker, IngestListener, StreamConnector};
use crate::supervisor::{StreamSupervisor, SupervisorExit};
use anyhow::{Context, Result};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// How a worker run ended.
#[derive(Debug)]
pub enum RunOutcome {
    Signalled(ShutdownSignal),
    /// The root token was cancelled by an embedder.
    Cancelled,
    Unhealthy,
    Failed(anyhow::Error),
}

impl RunOutcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            RunOutcome::Signalled(_) | RunOutcome::Cancelled => 0,
            RunOutcome::Failed(_) => 1,
            RunOutcome::Unhealthy => 2,
        }
    }

    fn stop_cause(&self) -> StopCause {
        match self {
            RunOutcome::Signalled(signal) => StopCause::Signal(*signal),
            RunOutcome::Cancelled => StopCause::Cancelled,
            RunOutcome::Unhealthy => StopCause::Unhealthy,
            RunOutcome::Failed(_) => StopCause::Failed,
        }
    }
}

/// Owns one worker's lifetime: stale-record expiry, the status record, the supervised stream,
/// and the stop sequence that leaves the record STOPPED on every exit path.
pub struct Runner {
    config: WorkerConfig,
    stores: Stores,
    connector: Arc<dyn StreamConnector>,
    queue: Arc<DrainQueue<StreamEvent>>,
    shutdown: CancellationToken,
    telemetry: Arc<Telemetry>,
}

struct WorkerParts {
    config: WorkerConfig,
    stores: Stores,
    connector: Arc<dyn StreamConnector>,
    listener: Arc<IngestListener>,
    checker: Arc<HealthChecker>,
    status: StatusReporter,
    shutdown: CancellationToken,
}

impl Runner {
    pub fn new(config: WorkerConfig, stores: Stores, connector: Arc<dyn StreamConnector>) -> Self {
        Self {
            config,
            stores,
            connector,
            queue: Arc::new(DrainQueue::new()),
            shutdown: CancellationToken::new(),
            telemetry: Arc::new(Telemetry::default()),
        }
    }

    /// Replaces the default unbounded event queue.
    pub fn with_queue(mut self, queue: Arc<DrainQueue<StreamEvent>>) -> Self {
        self.queue = queue;
        self
    }

    /// Returns a clone of the root shutdown token so embedders can stop the worker themselves.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    /// Runs until SIGINT/SIGTERM, the root token is cancelled, or the worker gives up.
    ///
    /// Signal handlers are installed before the worker record is created.
    pub async fn run_until_signal(&self) -> RunOutcome {
        let mut signals = match ShutdownSignals::install() {
            Ok(signals) => signals,
            Err(err) => {
                tracing::error!(
                    target: "termstream::runner",
                    error = %format!("{err:#}"),
                    "worker failed to start"
                );
                return RunOutcome::Failed(err);
            }
        };
        self.run_until(signals.recv()).await
    }

    /// Like [`Runner::run_until_signal`] with a caller-supplied signal source.
    pub async fn run_until<F>(&self, signal: F) -> RunOutcome
    where
        F: Future<Output = Result<ShutdownSignal>>,
    {
        let status = match self.prepare().await {
            Ok(status) => status,
            Err(err) => {
                tracing::error!(
                    target: "termstream::runner",
                    error = %format!("{err:#}"),
                    "worker failed to start"
                );
                return RunOutcome::Failed(err);
            }
        };
        let stop = StopSequence::new(status.clone(), self.shutdown.clone());

        let outcome = self.supervise(status, &stop, signal).await;

        // Guaranteed cleanup; a no-op when the signal path already stopped.
        if let Err(err) = stop.stop(outcome.stop_cause()).await {
            tracing::error!(
                target: "termstream::runner",
                error = %format!("{err:#}"),
                "failed to record stopped status"
            );
        }

        let snapshot = self.telemetry.snapshot();
        tracing::info!(
            target: "termstream::runner",
            outcome = ?outcome,
            received = snapshot.events_received,
            persisted = snapshot.events_persisted,
            dropped = snapshot.events_dropped,
            flushes = snapshot.flushes,
            stream_errors = snapshot.stream_errors,
            "worker finished"
        );
        outcome
    }

    async fn prepare(&self) -> Result<StatusReporter> {
        let expired = self
            .stores
            .status
            .expire_timed_out(Utc::now())
            .await
            .context("failed to expire stale worker records")?;
        if expired > 0 {
            tracing::info!(target: "termstream::runner", expired, "expired stale worker records");
        }

        let status =
            StatusReporter::create(self.stores.status.clone(), self.config.status_timeout())
                .await?;
        tracing::info!(target: "termstream::runner", worker = status.id(), "worker registered");
        Ok(status)
    }

    async fn supervise<F>(&self, status: StatusReporter, stop: &StopSequence, signal: F) -> RunOutcome
    where
        F: Future<Output = Result<ShutdownSignal>>,
    {
        let listener = Arc::new(IngestListener::new(
            self.queue.clone(),
            self.stores.events.clone(),
            self.telemetry.clone(),
        ));
        let checker = Arc::new(HealthChecker::new(
            listener.clone(),
            self.stores.terms.clone(),
            status.clone(),
            self.telemetry.clone(),
            self.config.max_consecutive_errors(),
        ));
        let mut worker = tokio::spawn(run_worker(WorkerParts {
            config: self.config.clone(),
            stores: self.stores.clone(),
            connector: self.connector.clone(),
            listener: listener.clone(),
            checker,
            status,
            shutdown: self.shutdown.clone(),
        }));

        tokio::pin!(signal);
        let outcome = tokio::select! {
            joined = &mut worker => worker_outcome(joined),
            received = &mut signal => {
                self.shutdown.cancel();
                let outcome = match received {
                    Ok(signal) => {
                        tracing::info!(
                            target: "termstream::runner",
                            signal = %signal,
                            "received termination signal; stopping"
                        );
                        RunOutcome::Signalled(signal)
                    }
                    Err(err) => RunOutcome::Failed(err),
                };
                // Let an in-flight tick finish before the final flush.
                if let RunOutcome::Failed(err) = worker_outcome(worker.await) {
                    tracing::warn!(
                        target: "termstream::runner",
                        error = %format!("{err:#}"),
                        "worker ended with error during shutdown"
                    );
                }
                outcome
            }
        };

        if matches!(outcome, RunOutcome::Signalled(_) | RunOutcome::Cancelled) {
            if let Err(err) = listener.flush().await {
                tracing::warn!(
                    target: "termstream::runner",
                    error = %format!("{err:#}"),
                    "final flush failed"
                );
            }
        }

        if let RunOutcome::Signalled(signal) = &outcome {
            if let Err(err) = stop.stop(StopCause::Signal(*signal)).await {
                tracing::error!(
                    target: "termstream::runner",
                    error = %format!("{err:#}"),
                    "failed to record stopped status"
                );
            }
        }
        outcome
    }
}

async fn run_worker(parts: WorkerParts) -> Result<SupervisorExit> {
    let WorkerParts {
        config,
        stores,
        connector,
        listener,
        checker,
        status,
        shutdown,
    } = parts;

    let credentials = stores
        .credentials
        .lookup(config.credentials_name())
        .await
        .context("failed to resolve stream credentials")?;
    status.update(|record| record.credentials = Some(credentials.name.clone()));
    status.save().await?;
    tracing::info!(
        target: "termstream::runner",
        credentials = %credentials.name,
        "using credentials"
    );

    let transport = DynamicStream::new(
        connector,
        listener,
        credentials,
        DriverOptions {
            poll_interval: config.poll_interval(),
            min_poll_sleep: config.min_poll_sleep(),
        },
    );
    let supervisor = StreamSupervisor::new(transport, checker, config.retry_cooldown(), shutdown);
    Ok(supervisor.run().await)
}

fn worker_outcome(joined: Result<Result<SupervisorExit>, tokio::task::JoinError>) -> RunOutcome {
    match joined {
        Ok(Ok(SupervisorExit::Unhealthy)) => RunOutcome::Unhealthy,
        Ok(Ok(SupervisorExit::Cancelled)) => RunOutcome::Cancelled,
        Ok(Err(err)) => {
            tracing::error!(
                target: "termstream::runner",
                error = %format!("{err:#}"),
                "worker failed"
            );
            RunOutcome::Failed(err)
        }
        Err(err) => RunOutcome::Failed(anyhow::Error::new(err).context("worker task panicked")),
    }
}
