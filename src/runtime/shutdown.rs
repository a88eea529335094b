use crate::model::StreamStatus;
use crate::runtime::status::StatusReporter;
use anyhow::Result;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

/// Termination signals the worker reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownSignal::Interrupt => write!(f, "SIGINT"),
            ShutdownSignal::Terminate => write!(f, "SIGTERM"),
        }
    }
}

/// Why the stop sequence ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCause {
    Signal(ShutdownSignal),
    Cancelled,
    Unhealthy,
    Failed,
}

/// Registered SIGINT/SIGTERM listeners.
///
/// Handlers are installed by [`ShutdownSignals::install`], so a signal arriving before
/// [`ShutdownSignals::recv`] is first polled is still delivered instead of killing the process.
pub struct ShutdownSignals {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl ShutdownSignals {
    pub fn install() -> Result<Self> {
        #[cfg(unix)]
        {
            use anyhow::Context;
            use tokio::signal::unix::{signal, SignalKind};

            Ok(Self {
                interrupt: signal(SignalKind::interrupt())
                    .context("failed to install SIGINT handler")?,
                terminate: signal(SignalKind::terminate())
                    .context("failed to install SIGTERM handler")?,
            })
        }
        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Resolves with the next signal received.
    pub async fn recv(&mut self) -> Result<ShutdownSignal> {
        #[cfg(unix)]
        {
            tokio::select! {
                received = self.interrupt.recv() => match received {
                    Some(()) => Ok(ShutdownSignal::Interrupt),
                    None => anyhow::bail!("SIGINT listener closed"),
                },
                received = self.terminate.recv() => match received {
                    Some(()) => Ok(ShutdownSignal::Terminate),
                    None => anyhow::bail!("SIGTERM listener closed"),
                },
            }
        }
        #[cfg(not(unix))]
        {
            use anyhow::Context;

            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for Ctrl-C")?;
            Ok(ShutdownSignal::Interrupt)
        }
    }
}

/// Marks the worker stopped exactly once, whichever exit path gets there first.
#[derive(Clone)]
pub struct StopSequence {
    inner: Arc<StopInner>,
}

struct StopInner {
    triggered: AtomicBool,
    status: StatusReporter,
    shutdown: CancellationToken,
    cause: Mutex<Option<StopCause>>,
}

impl StopSequence {
    pub fn new(status: StatusReporter, shutdown: CancellationToken) -> Self {
        Self {
            inner: Arc::new(StopInner {
                triggered: AtomicBool::new(false),
                status,
                shutdown,
                cause: Mutex::new(None),
            }),
        }
    }

    /// Cancels the shutdown token, sets the status record to STOPPED and heartbeats it.
    ///
    /// Returns `Ok(false)` without touching anything when the sequence already ran.
    pub async fn stop(&self, cause: StopCause) -> Result<bool> {
        if self.inner.triggered.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }

        *self
            .inner
            .cause
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(cause);
        self.inner.shutdown.cancel();

        tracing::debug!(
            target: "termstream::runner",
            worker = self.inner.status.id(),
            cause = ?cause,
            "stopping worker"
        );

        self.inner.status.set_status(StreamStatus::Stopped);
        self.inner.status.heartbeat().await?;
        Ok(true)
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::SeqCst)
    }

    pub fn cause(&self) -> Option<StopCause> {
        *self
            .inner
            .cause
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
