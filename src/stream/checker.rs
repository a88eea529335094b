use super::listener::IngestListener;
use super::transport::TermChecker;
use crate::model::{enabled_term_set, StreamStatus};
use crate::runtime::status::StatusReporter;
use crate::runtime::telemetry::Telemetry;
use crate::storage::TermStore;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Periodic maintenance for a streaming worker.
///
/// Each tick flushes the listener, refreshes the enabled terms, and heartbeats the status
/// record. Recorded errors accumulate for the lifetime of the checker; nothing decays them.
pub struct HealthChecker {
    listener: Arc<IngestListener>,
    terms: Arc<dyn TermStore>,
    status: StatusReporter,
    telemetry: Arc<Telemetry>,
    error_count: AtomicU32,
    max_errors: u32,
}

impl HealthChecker {
    pub fn new(
        listener: Arc<IngestListener>,
        terms: Arc<dyn TermStore>,
        status: StatusReporter,
        telemetry: Arc<Telemetry>,
        max_errors: u32,
    ) -> Self {
        Self {
            listener,
            terms,
            status,
            telemetry,
            error_count: AtomicU32::new(0),
            max_errors,
        }
    }

    /// One maintenance pass. The flush always runs before the term query.
    pub async fn check(&self) -> Result<BTreeSet<String>> {
        let rate = self.listener.flush().await?;
        let errors = self.error_count();
        self.status.update(|record| {
            record.event_rate = rate;
            record.error_count = errors;
        });

        let rows = self
            .terms
            .enabled_terms()
            .await
            .context("failed to query enabled terms")?;
        let terms = enabled_term_set(&rows);

        let next = if terms.is_empty() {
            StreamStatus::Waiting
        } else {
            StreamStatus::Running
        };
        self.status.set_status(next);
        self.status.heartbeat().await?;

        tracing::debug!(
            target: "termstream::checker",
            terms = terms.len(),
            status = ?next,
            rate,
            "tick complete"
        );
        Ok(terms)
    }

    pub fn healthy(&self) -> bool {
        self.error_count() < self.max_errors
    }

    /// Logs `error` and counts it towards the unhealthy threshold.
    pub fn record_error(&self, error: &anyhow::Error) {
        let count = self
            .error_count
            .fetch_add(1, Ordering::SeqCst)
            .saturating_add(1);
        self.telemetry.record_stream_error();
        self.status.update(|record| record.error_count = count);
        tracing::error!(
            target: "termstream::checker",
            error = %format!("{error:#}"),
            error_count = count,
            max_errors = self.max_errors,
            "stream error"
        );
    }

    pub fn error_count(&self) -> u32 {
        self.error_count.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> &StatusReporter {
        &self.status
    }
}

impl TermChecker for HealthChecker {
    fn tick(&self) -> BoxFuture<'_, Result<BTreeSet<String>>> {
        Box::pin(self.check())
    }

    fn healthy(&self) -> bool {
        HealthChecker::healthy(self)
    }
}
