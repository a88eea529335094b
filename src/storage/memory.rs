use super::{CredentialStore, EventStore, StatusStore, TermStore};
use crate::model::{
    select_credentials, Credentials, FilterTerm, StatusRecord, StreamStatus, WorkerStatus,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Default)]
struct MemoryState {
    events: Vec<StatusRecord>,
    bulk_inserts: usize,
    terms: Vec<FilterTerm>,
    workers: BTreeMap<String, WorkerStatus>,
    status_history: BTreeMap<String, Vec<StreamStatus>>,
    credentials: Vec<Credentials>,
}

/// In-process backend for every storage collaborator.
///
/// Keeps a per-worker history of saved statuses so callers can audit transitions.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_terms<I>(self, terms: I) -> Self
    where
        I: IntoIterator<Item = FilterTerm>,
    {
        self.set_terms(terms);
        self
    }

    pub fn with_credentials(self, credentials: Credentials) -> Self {
        self.lock().credentials.push(credentials);
        self
    }

    pub fn set_terms<I>(&self, terms: I)
    where
        I: IntoIterator<Item = FilterTerm>,
    {
        self.lock().terms = terms.into_iter().collect();
    }

    /// Seeds a worker record directly, bypassing `create`.
    pub fn insert_worker(&self, record: WorkerStatus) {
        self.lock().workers.insert(record.id.clone(), record);
    }

    pub fn events(&self) -> Vec<StatusRecord> {
        self.lock().events.clone()
    }

    pub fn bulk_insert_count(&self) -> usize {
        self.lock().bulk_inserts
    }

    pub fn worker(&self, id: &str) -> Option<WorkerStatus> {
        self.lock().workers.get(id).cloned()
    }

    pub fn workers(&self) -> Vec<WorkerStatus> {
        self.lock().workers.values().cloned().collect()
    }

    /// Status value of every save for `id`, oldest first.
    pub fn status_history(&self, id: &str) -> Vec<StreamStatus> {
        self.lock()
            .status_history
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn store_worker(&self, record: &WorkerStatus) {
        let mut state = self.lock();
        state
            .status_history
            .entry(record.id.clone())
            .or_default()
            .push(record.status());
        state.workers.insert(record.id.clone(), record.clone());
    }
}

impl EventStore for MemoryStore {
    fn bulk_insert<'a>(&'a self, records: Vec<StatusRecord>) -> BoxFuture<'a, Result<usize>> {
        Box::pin(async move {
            let mut state = self.lock();
            let count = records.len();
            state.events.extend(records);
            state.bulk_inserts += 1;
            Ok(count)
        })
    }
}

impl TermStore for MemoryStore {
    fn enabled_terms<'a>(&'a self) -> BoxFuture<'a, Result<Vec<FilterTerm>>> {
        Box::pin(async move {
            Ok(self
                .lock()
                .terms
                .iter()
                .filter(|term| term.enabled)
                .cloned()
                .collect())
        })
    }
}

impl StatusStore for MemoryStore {
    fn create<'a>(&'a self, timeout: Duration) -> BoxFuture<'a, Result<WorkerStatus>> {
        Box::pin(async move {
            let mut record = WorkerStatus::for_current_process(timeout, Utc::now());
            // Several workers can share one process in tests; keep ids unique.
            let sequence = self.lock().workers.len();
            record.id = format!("{}-{sequence}", record.id);
            self.store_worker(&record);
            Ok(record)
        })
    }

    fn save<'a>(&'a self, record: &'a WorkerStatus) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.store_worker(record);
            Ok(())
        })
    }

    fn expire_timed_out<'a>(&'a self, now: DateTime<Utc>) -> BoxFuture<'a, Result<usize>> {
        Box::pin(async move {
            let expired: Vec<WorkerStatus> = self
                .lock()
                .workers
                .values()
                .filter(|record| record.is_expired(now))
                .cloned()
                .collect();

            for mut record in expired.iter().cloned() {
                record.set_status(StreamStatus::Stopped);
                self.store_worker(&record);
            }
            Ok(expired.len())
        })
    }
}

impl CredentialStore for MemoryStore {
    fn lookup<'a>(&'a self, name: Option<&'a str>) -> BoxFuture<'a, Result<Credentials>> {
        Box::pin(async move {
            let state = self.lock();
            select_credentials(&state.credentials, name).context("credential lookup failed")
        })
    }
}
