use super::transport::{DisconnectDirective, EventSink};
use crate::model::{StatusRecord, StreamEvent};
use crate::queue::drain_queue::DrainQueue;
use crate::runtime::telemetry::Telemetry;
use crate::storage::EventStore;
use anyhow::{Context, Result};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Flush windows shorter than this are rounded up when computing the rate.
const MIN_RATE_WINDOW: Duration = Duration::from_millis(1);

/// Buffers events from the receive path and persists them in batches on demand.
///
/// `on_event` only pushes onto the queue. `flush` is called by the maintenance tick, never by
/// the receive path, and may run concurrently with `on_event`.
pub struct IngestListener {
    queue: Arc<DrainQueue<StreamEvent>>,
    events: Arc<dyn EventStore>,
    telemetry: Arc<Telemetry>,
    last_flush: Mutex<Instant>,
}

impl IngestListener {
    pub fn new(
        queue: Arc<DrainQueue<StreamEvent>>,
        events: Arc<dyn EventStore>,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self {
            queue,
            events,
            telemetry,
            last_flush: Mutex::new(Instant::now()),
        }
    }

    pub fn queue(&self) -> &Arc<DrainQueue<StreamEvent>> {
        &self.queue
    }

    /// Persists everything queued so far as one batch.
    ///
    /// Returns events per second since the previous call. An empty queue yields `0.0` and no
    /// storage write.
    pub async fn flush(&self) -> Result<f64> {
        let elapsed = {
            let mut last = self
                .last_flush
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let now = Instant::now();
            let elapsed = now.saturating_duration_since(*last);
            *last = now;
            elapsed
        };

        let batch = self.queue.try_drain_all();
        if batch.is_empty() {
            self.telemetry.record_flush(0);
            return Ok(0.0);
        }

        let count = batch.len();
        let records: Vec<StatusRecord> = batch.iter().map(StatusRecord::from_event).collect();
        self.events
            .bulk_insert(records)
            .await
            .with_context(|| format!("failed to persist batch of {count} events"))?;

        let rate = count as f64 / elapsed.max(MIN_RATE_WINDOW).as_secs_f64();
        self.telemetry.record_flush(count as u64);
        tracing::info!(
            target: "termstream::listener",
            inserted = count,
            rate = format!("{rate:.2}"),
            "inserted event batch"
        );
        Ok(rate)
    }
}

impl EventSink for IngestListener {
    fn on_event(&self, event: StreamEvent) {
        self.telemetry.record_event_received();
        if self.queue.push(event) {
            self.telemetry.record_event_dropped();
        }
    }

    fn on_disconnect(&self, code: u16, reason: &str) -> DisconnectDirective {
        self.telemetry.record_disconnect();
        tracing::warn!(
            target: "termstream::listener",
            code,
            reason,
            "received disconnect from stream provider"
        );
        DisconnectDirective::Reconnect
    }
}
