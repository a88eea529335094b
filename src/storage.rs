//! Storage collaborators the worker talks to: batched event persistence, the filter-term
//! store, worker status records, and credential lookup. Each is a small object-safe trait so
//! backends can be swapped; [`memory::MemoryStore`] and [`file::FileStore`] implement all four.

pub mod file;
pub mod memory;

use crate::model::{Credentials, FilterTerm, StatusRecord, WorkerStatus};
use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;

pub use file::FileStore;
pub use memory::MemoryStore;

pub trait EventStore: Send + Sync {
    /// Persists a whole batch in one write. Returns the number of records written.
    fn bulk_insert<'a>(&'a self, records: Vec<StatusRecord>) -> BoxFuture<'a, Result<usize>>;
}

pub trait TermStore: Send + Sync {
    /// Every term currently flagged as enabled.
    fn enabled_terms<'a>(&'a self) -> BoxFuture<'a, Result<Vec<FilterTerm>>>;
}

pub trait StatusStore: Send + Sync {
    /// Creates and persists the status record for this worker.
    fn create<'a>(&'a self, timeout: Duration) -> BoxFuture<'a, Result<WorkerStatus>>;

    fn save<'a>(&'a self, record: &'a WorkerStatus) -> BoxFuture<'a, Result<()>>;

    /// Marks every live record whose expiry is before `now` as stopped. Returns how many changed.
    fn expire_timed_out<'a>(&'a self, now: DateTime<Utc>) -> BoxFuture<'a, Result<usize>>;
}

pub trait CredentialStore: Send + Sync {
    /// Looks credentials up by name, or returns the first available when `name` is `None`.
    fn lookup<'a>(&'a self, name: Option<&'a str>) -> BoxFuture<'a, Result<Credentials>>;
}

/// The four collaborators a worker needs, bundled for wiring.
#[derive(Clone)]
pub struct Stores {
    pub events: Arc<dyn EventStore>,
    pub terms: Arc<dyn TermStore>,
    pub status: Arc<dyn StatusStore>,
    pub credentials: Arc<dyn CredentialStore>,
}

impl Stores {
    /// Uses one backend for every collaborator.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: EventStore + TermStore + StatusStore + CredentialStore + 'static,
    {
        Self {
            events: backend.clone(),
            terms: backend.clone(),
            status: backend.clone(),
            credentials: backend,
        }
    }
}
