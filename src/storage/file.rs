use super::{CredentialStore, EventStore, StatusStore, TermStore};
use crate::model::{
    select_credentials, Credentials, FilterTerm, StatusRecord, StreamStatus, WorkerStatus,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

const TERMS_FILE: &str = "terms.json";
const CREDENTIALS_FILE: &str = "credentials.json";
const EVENTS_FILE: &str = "events.jsonl";
const WORKERS_FILE: &str = "workers.json";

/// Storage backend over a data directory.
///
/// - `terms.json`: array of `{"term": .., "enabled": ..}`, re-read on every query
/// - `credentials.json`: array of credential objects
/// - `events.jsonl`: one persisted record per line, append-only
/// - `workers.json`: status records keyed by worker id
///
/// Writes from one process are serialized; several processes sharing a directory can race on
/// `workers.json`.
pub struct FileStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Creates the data directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let store = Self::new(root);
        fs::create_dir_all(&store.root)
            .await
            .with_context(|| format!("failed to create data dir {}", store.root.display()))?;
        Ok(store)
    }

    pub async fn read_workers(&self) -> Result<BTreeMap<String, WorkerStatus>> {
        read_json_or_default(&self.root.join(WORKERS_FILE)).await
    }

    async fn write_worker(&self, record: &WorkerStatus) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut workers = self.read_workers().await?;
        workers.insert(record.id.clone(), record.clone());
        write_json_atomic(&self.root.join(WORKERS_FILE), &workers).await
    }
}

impl EventStore for FileStore {
    fn bulk_insert<'a>(&'a self, records: Vec<StatusRecord>) -> BoxFuture<'a, Result<usize>> {
        Box::pin(async move {
            let mut buffer = Vec::with_capacity(records.len() * 256);
            for record in &records {
                serde_json::to_writer(&mut buffer, record)
                    .context("failed to encode status record")?;
                buffer.push(b'\n');
            }

            let path = self.root.join(EVENTS_FILE);
            let _guard = self.write_lock.lock().await;
            let mut file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
                .with_context(|| format!("failed to open {}", path.display()))?;
            file.write_all(&buffer)
                .await
                .with_context(|| format!("failed to append to {}", path.display()))?;
            file.flush().await?;
            Ok(records.len())
        })
    }
}

impl TermStore for FileStore {
    fn enabled_terms<'a>(&'a self) -> BoxFuture<'a, Result<Vec<FilterTerm>>> {
        Box::pin(async move {
            let terms: Vec<FilterTerm> = read_json_or_default(&self.root.join(TERMS_FILE)).await?;
            Ok(terms.into_iter().filter(|term| term.enabled).collect())
        })
    }
}

impl StatusStore for FileStore {
    fn create<'a>(&'a self, timeout: Duration) -> BoxFuture<'a, Result<WorkerStatus>> {
        Box::pin(async move {
            let record = WorkerStatus::for_current_process(timeout, Utc::now());
            self.write_worker(&record).await?;
            Ok(record)
        })
    }

    fn save<'a>(&'a self, record: &'a WorkerStatus) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.write_worker(record))
    }

    fn expire_timed_out<'a>(&'a self, now: DateTime<Utc>) -> BoxFuture<'a, Result<usize>> {
        Box::pin(async move {
            let _guard = self.write_lock.lock().await;
            let mut workers = self.read_workers().await?;
            let mut expired = 0usize;
            for record in workers.values_mut() {
                if record.is_expired(now) {
                    record.set_status(StreamStatus::Stopped);
                    expired += 1;
                }
            }
            if expired > 0 {
                write_json_atomic(&self.root.join(WORKERS_FILE), &workers).await?;
            }
            Ok(expired)
        })
    }
}

impl CredentialStore for FileStore {
    fn lookup<'a>(&'a self, name: Option<&'a str>) -> BoxFuture<'a, Result<Credentials>> {
        Box::pin(async move {
            let available: Vec<Credentials> =
                read_json_or_default(&self.root.join(CREDENTIALS_FILE)).await?;
            select_credentials(&available, name).context("credential lookup failed")
        })
    }
}

async fn read_json_or_default<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    match fs::read(path).await {
        Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(T::default()),
        Ok(bytes) => serde_json::from_slice(&bytes)
            .with_context(|| format!("failed to parse {}", path.display())),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(T::default()),
        Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
    }
}

async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)
        .with_context(|| format!("failed to encode {}", path.display()))?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes)
        .await
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .await
        .with_context(|| format!("failed to replace {}", path.display()))
}
