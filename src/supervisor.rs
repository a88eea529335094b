//! Outer retry loop around a [`StreamTransport`].

use crate::stream::{HealthChecker, StreamTransport};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Why the supervisor loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorExit {
    /// The checker crossed its error threshold. Terminal.
    Unhealthy,
    Cancelled,
}

/// Keeps a stream connection up while the checker stays healthy.
///
/// Every error escaping `maintain` is recorded on the checker and followed by a fixed cooldown.
/// Once the checker is unhealthy the loop ends without another attempt.
pub struct StreamSupervisor<T> {
    transport: T,
    checker: Arc<HealthChecker>,
    cooldown: Duration,
    shutdown: CancellationToken,
}

impl<T: StreamTransport> StreamSupervisor<T> {
    pub fn new(
        transport: T,
        checker: Arc<HealthChecker>,
        cooldown: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            transport,
            checker,
            cooldown,
            shutdown,
        }
    }

    pub async fn run(&self) -> SupervisorExit {
        let mut attempt: u64 = 0;
        loop {
            if self.shutdown.is_cancelled() {
                return SupervisorExit::Cancelled;
            }
            if !self.checker.healthy() {
                tracing::error!(
                    target: "termstream::supervisor",
                    errors = self.checker.error_count(),
                    "stopping because term checker not ok"
                );
                return SupervisorExit::Unhealthy;
            }

            attempt += 1;
            tracing::debug!(target: "termstream::supervisor", attempt, "starting stream");

            match self
                .transport
                .maintain(self.checker.as_ref(), &self.shutdown)
                .await
            {
                Ok(()) => continue,
                Err(err) => {
                    self.checker.record_error(&err);
                    if !self.checker.healthy() {
                        continue;
                    }
                    tracing::info!(
                        target: "termstream::supervisor",
                        attempt,
                        cooldown_ms = self.cooldown.as_millis() as u64,
                        "retrying stream after cooldown"
                    );
                    if !sleep_with_cancellation(self.cooldown, &self.shutdown).await {
                        return SupervisorExit::Cancelled;
                    }
                }
            }
        }
    }

    pub fn checker(&self) -> &Arc<HealthChecker> {
        &self.checker
    }
}

/// Returns `false` when `token` fired before `delay` elapsed.
async fn sleep_with_cancellation(delay: Duration, token: &CancellationToken) -> bool {
    if delay.is_zero() {
        tokio::task::yield_now().await;
        return !token.is_cancelled();
    }

    tokio::select! {
        _ = token.cancelled() => false,
        _ = sleep(delay) => true,
    }
}
