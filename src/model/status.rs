use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lifecycle of a worker as seen by external monitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamStatus {
    /// Connected or connectable, but no term is enabled.
    Waiting,
    /// At least one term is enabled.
    Running,
    /// Terminal.
    Stopped,
}

/// Liveness record for one worker process.
///
/// The worker only ever writes this record; monitors compare `expires_at` against the clock to
/// spot a worker that stopped heartbeating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub id: String,
    pub hostname: String,
    pub process_id: u32,
    status: StreamStatus,
    /// Events persisted per second over the last flush window.
    pub event_rate: f64,
    pub error_count: u32,
    /// Name of the credentials this worker streams with, once resolved.
    pub credentials: Option<String>,
    pub timeout_seconds: u64,
    pub created_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl WorkerStatus {
    pub fn new(
        id: impl Into<String>,
        hostname: impl Into<String>,
        process_id: u32,
        timeout: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        let mut record = Self {
            id: id.into(),
            hostname: hostname.into(),
            process_id,
            status: StreamStatus::Waiting,
            event_rate: 0.0,
            error_count: 0,
            credentials: None,
            timeout_seconds: timeout.as_secs().max(1),
            created_at: now,
            last_heartbeat: now,
            expires_at: now,
        };
        record.touch(now);
        record
    }

    /// Record describing the current OS process.
    pub fn for_current_process(timeout: Duration, now: DateTime<Utc>) -> Self {
        let hostname = hostname::get()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_owned());
        let process_id = std::process::id();
        let id = format!("{hostname}-{process_id}-{}", now.timestamp_millis());
        Self::new(id, hostname, process_id, timeout, now)
    }

    pub fn status(&self) -> StreamStatus {
        self.status
    }

    pub fn is_stopped(&self) -> bool {
        self.status == StreamStatus::Stopped
    }

    /// Applies a status change. Once stopped, the record stays stopped and `false` is returned
    /// for any other target.
    pub fn set_status(&mut self, next: StreamStatus) -> bool {
        if self.is_stopped() && next != StreamStatus::Stopped {
            return false;
        }
        self.status = next;
        true
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Refreshes the heartbeat timestamp and pushes the expiry out by one timeout.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        let window = i64::try_from(self.timeout_seconds)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX);
        self.last_heartbeat = now;
        self.expires_at = now
            .checked_add_signed(window)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
    }

    /// A live record whose heartbeat is overdue.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        !self.is_stopped() && self.expires_at < now
    }
}
