use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use serde_json::json;
use termstream::{
    FileStore, NdjsonConnector, RunOutcome, Runner, ShutdownSignal, StatusRecord, Stores,
    StreamStatus, WorkerConfig,
};
use tokio::{net::TcpListener, time::timeout};

use crate::support::{
    helpers::{credentials, init_tracing, wait_until},
    mock_provider::MockProvider,
};

fn fast_config() -> Result<WorkerConfig> {
    WorkerConfig::builder()
        .poll_interval(Duration::from_millis(200))
        .retry_cooldown(Duration::from_millis(50))
        .max_consecutive_errors(5)
        .build()
}

fn write_fixture(dir: &std::path::Path, name: &str, value: serde_json::Value) -> Result<()> {
    std::fs::write(dir.join(name), serde_json::to_vec(&value)?)
        .with_context(|| format!("failed to write {name}"))
}

fn persisted_records(dir: &std::path::Path) -> Vec<StatusRecord> {
    std::fs::read_to_string(dir.join("events.jsonl"))
        .unwrap_or_default()
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn events_flow_from_provider_to_disk() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    write_fixture(dir.path(), "terms.json", json!([
        { "term": "rust", "enabled": true },
        { "term": "go", "enabled": false },
    ]))?;
    write_fixture(dir.path(), "credentials.json", json!([credentials("primary")]))?;

    let provider = MockProvider::start(vec![
        json!({ "id_str": "1", "text": "hello", "user": { "screen_name": "ferris" } }),
        json!({ "id_str": "2", "text": "world", "user": { "screen_name": "ferris" } }),
    ])
    .await?;

    let store = Arc::new(FileStore::open(dir.path()).await?);
    let runner = Runner::new(
        fast_config()?,
        Stores::from_backend(store.clone()),
        Arc::new(NdjsonConnector::new(provider.addr())),
    );
    let token = runner.cancellation_token();
    let run = tokio::spawn(async move {
        runner
            .run_until(std::future::pending::<Result<ShutdownSignal>>())
            .await
    });

    let data_dir = dir.path().to_path_buf();
    wait_until(Duration::from_secs(5), || persisted_records(&data_dir).len() >= 2).await?;
    token.cancel();
    let outcome = timeout(Duration::from_secs(5), run)
        .await
        .context("runner should stop after cancellation")??;
    assert!(matches!(outcome, RunOutcome::Cancelled), "got {outcome:?}");

    let mut texts: Vec<String> = persisted_records(dir.path())
        .into_iter()
        .map(|record| record.text)
        .collect();
    texts.sort();
    assert_eq!(texts, vec!["hello", "world"]);

    assert_eq!(
        provider.subscriptions().first(),
        Some(&json!({
            "track": ["rust"],
            "auth": { "key": "primary-key", "token": "primary-token" }
        }))
    );

    let workers = store.read_workers().await?;
    assert_eq!(workers.len(), 1);
    let worker = workers.values().next().context("worker record missing")?;
    assert_eq!(worker.status(), StreamStatus::Stopped);
    assert_eq!(worker.credentials.as_deref(), Some("primary"));

    provider.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_credentials_fail_startup() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let store = Arc::new(FileStore::open(dir.path()).await?);
    let runner = Runner::new(
        fast_config()?,
        Stores::from_backend(store.clone()),
        Arc::new(NdjsonConnector::new("127.0.0.1:9")),
    );

    let outcome = timeout(
        Duration::from_secs(5),
        runner.run_until(std::future::pending::<Result<ShutdownSignal>>()),
    )
    .await?;

    let RunOutcome::Failed(err) = &outcome else {
        panic!("expected startup failure, got {outcome:?}");
    };
    assert!(format!("{err:#}").contains("no credentials are configured"));
    assert_eq!(outcome.exit_code(), 1);

    let workers = store.read_workers().await?;
    assert!(workers.values().all(|worker| worker.is_stopped()));
    assert_eq!(workers.len(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreachable_provider_makes_the_worker_unhealthy() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    write_fixture(dir.path(), "terms.json", json!([{ "term": "rust", "enabled": true }]))?;
    write_fixture(dir.path(), "credentials.json", json!([credentials("primary")]))?;

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?.to_string();
    drop(listener);

    let store = Arc::new(FileStore::open(dir.path()).await?);
    let runner = Runner::new(
        fast_config()?,
        Stores::from_backend(store.clone()),
        Arc::new(NdjsonConnector::new(addr)),
    );

    let outcome = timeout(
        Duration::from_secs(10),
        runner.run_until(std::future::pending::<Result<ShutdownSignal>>()),
    )
    .await
    .context("worker should give up after repeated failures")?;

    assert!(matches!(outcome, RunOutcome::Unhealthy), "got {outcome:?}");
    assert_eq!(outcome.exit_code(), 2);

    let workers = store.read_workers().await?;
    let worker = workers.values().next().context("worker record missing")?;
    assert_eq!(worker.status(), StreamStatus::Stopped);
    assert_eq!(worker.error_count, 5);
    Ok(())
}
