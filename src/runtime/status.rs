use crate::model::{StreamStatus, WorkerStatus};
use crate::storage::StatusStore;
use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Shared handle over this worker's status record and the store it is written to.
///
/// Mutations are synchronous and only touch the in-memory copy; `save`/`heartbeat` persist a
/// snapshot. Writes are serialized so the store always receives snapshots in mutation order.
#[derive(Clone)]
pub struct StatusReporter {
    id: Arc<str>,
    record: Arc<Mutex<WorkerStatus>>,
    write_lock: Arc<tokio::sync::Mutex<()>>,
    store: Arc<dyn StatusStore>,
}

impl StatusReporter {
    /// Wraps a record that already exists in `store`.
    pub fn new(store: Arc<dyn StatusStore>, record: WorkerStatus) -> Self {
        Self {
            id: Arc::from(record.id.as_str()),
            record: Arc::new(Mutex::new(record)),
            write_lock: Arc::new(tokio::sync::Mutex::new(())),
            store,
        }
    }

    /// Creates this worker's record in `store`.
    pub async fn create(store: Arc<dyn StatusStore>, timeout: Duration) -> Result<Self> {
        let record = store
            .create(timeout)
            .await
            .context("failed to create worker status record")?;
        Ok(Self::new(store, record))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn snapshot(&self) -> WorkerStatus {
        self.lock().clone()
    }

    pub fn status(&self) -> StreamStatus {
        self.lock().status()
    }

    pub fn update<F, T>(&self, apply: F) -> T
    where
        F: FnOnce(&mut WorkerStatus) -> T,
    {
        apply(&mut self.lock())
    }

    /// Returns `false` when the record is already stopped and `next` was ignored.
    pub fn set_status(&self, next: StreamStatus) -> bool {
        self.update(|record| record.set_status(next))
    }

    pub async fn save(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let snapshot = self.snapshot();
        self.store
            .save(&snapshot)
            .await
            .context("failed to save worker status")
    }

    /// Refreshes the heartbeat timestamp and persists the record.
    pub async fn heartbeat(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let snapshot = self.update(|record| {
            record.touch(Utc::now());
            record.clone()
        });
        self.store
            .save(&snapshot)
            .await
            .context("failed to heartbeat worker status")
    }

    fn lock(&self) -> MutexGuard<'_, WorkerStatus> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
