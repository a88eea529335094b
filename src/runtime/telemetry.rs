use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless. Library components only emit through the
/// `tracing` macros; embedders that want a different sink install their own subscriber instead.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Process-lifetime counters shared by the listener, checker, and supervisor.
#[derive(Default, Debug)]
pub struct Telemetry {
    events_received: AtomicU64,
    events_persisted: AtomicU64,
    events_dropped: AtomicU64,
    flushes: AtomicU64,
    empty_flushes: AtomicU64,
    disconnects: AtomicU64,
    stream_errors: AtomicU64,
}

impl Telemetry {
    pub fn record_event_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flush(&self, persisted: u64) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        if persisted == 0 {
            self.empty_flushes.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.events_persisted.fetch_add(persisted, Ordering::Relaxed);
    }

    pub fn record_disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stream_error(&self) {
        self.stream_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn events_persisted(&self) -> u64 {
        self.events_persisted.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            events_persisted: self.events_persisted.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            empty_flushes: self.empty_flushes.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
            stream_errors: self.stream_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub events_received: u64,
    pub events_persisted: u64,
    pub events_dropped: u64,
    pub flushes: u64,
    pub empty_flushes: u64,
    pub disconnects: u64,
    pub stream_errors: u64,
}
