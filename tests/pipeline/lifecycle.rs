use std::{sync::Arc, time::Duration};

use chrono::{TimeDelta, Utc};
use serde_json::json;
use termstream::{
    FilterTerm, MemoryStore, RunOutcome, Runner, ShutdownSignal, Stores, StreamStatus,
    WorkerConfig, WorkerStatus,
};
use tokio::time::sleep;

use crate::support::helpers::{
    credentials, init_tracing, manual_signal, FailingConnector, ScriptedConnector,
};

fn worker_config() -> WorkerConfig {
    WorkerConfig::builder()
        .poll_interval(Duration::from_secs(10))
        .retry_cooldown(Duration::from_secs(3))
        .max_consecutive_errors(5)
        .build()
        .unwrap()
}

fn store_tracking(terms: &[&str]) -> Arc<MemoryStore> {
    Arc::new(
        MemoryStore::new()
            .with_credentials(credentials("primary"))
            .with_terms(terms.iter().copied().map(FilterTerm::enabled)),
    )
}

fn only_worker(store: &MemoryStore) -> WorkerStatus {
    let workers = store.workers();
    assert_eq!(workers.len(), 1, "expected exactly one worker record");
    workers.into_iter().next().unwrap()
}

fn stopped_saves(store: &MemoryStore, id: &str) -> usize {
    store
        .status_history(id)
        .into_iter()
        .filter(|status| *status == StreamStatus::Stopped)
        .count()
}

#[tokio::test(start_paused = true)]
async fn five_connection_failures_stop_the_worker() {
    init_tracing();
    let store = store_tracking(&["rust"]);
    let connector = Arc::new(FailingConnector::default());
    let runner = Runner::new(
        worker_config(),
        Stores::from_backend(store.clone()),
        connector.clone(),
    );

    let outcome = runner
        .run_until(std::future::pending::<anyhow::Result<ShutdownSignal>>())
        .await;

    assert!(matches!(outcome, RunOutcome::Unhealthy), "got {outcome:?}");
    assert_eq!(outcome.exit_code(), 2);
    assert_eq!(connector.attempts(), 5, "no sixth attempt after the threshold");

    let worker = only_worker(&store);
    assert_eq!(worker.status(), StreamStatus::Stopped);
    assert_eq!(worker.error_count, 5);
    assert_eq!(stopped_saves(&store, &worker.id), 1);
    assert_eq!(runner.telemetry().snapshot().stream_errors, 5);
}

#[tokio::test(start_paused = true)]
async fn signal_mid_run_stops_exactly_once() {
    init_tracing();
    let store = store_tracking(&["rust"]);
    let connector = Arc::new(ScriptedConnector::new(vec![
        json!({ "id_str": "1", "text": "a" }),
        json!({ "id_str": "2", "text": "b" }),
        json!({ "id_str": "3", "text": "c" }),
    ]));
    let runner = Runner::new(
        worker_config(),
        Stores::from_backend(store.clone()),
        connector.clone(),
    );

    let (fire, signal) = manual_signal();
    tokio::spawn(async move {
        sleep(Duration::from_secs(25)).await;
        let _ = fire.send(ShutdownSignal::Terminate);
    });
    let outcome = runner.run_until(signal).await;

    assert!(
        matches!(outcome, RunOutcome::Signalled(ShutdownSignal::Terminate)),
        "got {outcome:?}"
    );
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(connector.connections(), 1);
    assert_eq!(store.events().len(), 3);

    let worker = only_worker(&store);
    let history = store.status_history(&worker.id);
    assert!(history.contains(&StreamStatus::Running));
    assert_eq!(history.last(), Some(&StreamStatus::Stopped));
    assert_eq!(stopped_saves(&store, &worker.id), 1);
    assert_eq!(worker.credentials.as_deref(), Some("primary"));
}

#[tokio::test(start_paused = true)]
async fn signal_before_next_tick_still_persists_received_events() {
    init_tracing();
    let store = store_tracking(&["rust"]);
    let connector = Arc::new(ScriptedConnector::new(vec![
        json!({ "text": "a" }),
        json!({ "text": "b" }),
        json!({ "text": "c" }),
    ]));
    let runner = Runner::new(
        worker_config(),
        Stores::from_backend(store.clone()),
        connector,
    );

    let (fire, signal) = manual_signal();
    tokio::spawn(async move {
        sleep(Duration::from_secs(2)).await;
        let _ = fire.send(ShutdownSignal::Interrupt);
    });
    let outcome = runner.run_until(signal).await;

    assert!(matches!(outcome, RunOutcome::Signalled(ShutdownSignal::Interrupt)));
    assert_eq!(store.events().len(), 3);
    assert_eq!(store.bulk_insert_count(), 1);
    assert_eq!(runner.telemetry().events_persisted(), 3);
}

#[tokio::test(start_paused = true)]
async fn status_follows_terms_from_waiting_to_running() {
    init_tracing();
    let store = store_tracking(&[]);
    let connector = Arc::new(ScriptedConnector::new(Vec::new()));
    let runner = Runner::new(
        worker_config(),
        Stores::from_backend(store.clone()),
        connector.clone(),
    );

    let token = runner.cancellation_token();
    tokio::spawn({
        let store = store.clone();
        async move {
            sleep(Duration::from_secs(15)).await;
            store.set_terms([FilterTerm::enabled("rust")]);
            sleep(Duration::from_secs(20)).await;
            token.cancel();
        }
    });
    let outcome = runner
        .run_until(std::future::pending::<anyhow::Result<ShutdownSignal>>())
        .await;

    assert!(matches!(outcome, RunOutcome::Cancelled), "got {outcome:?}");
    assert_eq!(connector.connections(), 1);

    let worker = only_worker(&store);
    let history = store.status_history(&worker.id);
    let first_running = history
        .iter()
        .position(|status| *status == StreamStatus::Running)
        .expect("worker never reported RUNNING");
    assert!(history[..first_running].contains(&StreamStatus::Waiting));
    assert_eq!(history.last(), Some(&StreamStatus::Stopped));
}

#[tokio::test(start_paused = true)]
async fn stale_records_are_expired_at_startup() {
    init_tracing();
    let store = store_tracking(&[]);
    let long_ago = Utc::now() - TimeDelta::try_hours(1).unwrap();
    store.insert_worker(WorkerStatus::new(
        "stale-worker",
        "old-host",
        42,
        Duration::from_secs(30),
        long_ago,
    ));
    store.insert_worker(WorkerStatus::new(
        "live-peer",
        "peer-host",
        7,
        Duration::from_secs(3600),
        Utc::now(),
    ));
    let runner = Runner::new(
        worker_config(),
        Stores::from_backend(store.clone()),
        Arc::new(ScriptedConnector::new(Vec::new())),
    );

    let token = runner.cancellation_token();
    tokio::spawn(async move {
        sleep(Duration::from_secs(1)).await;
        token.cancel();
    });
    let outcome = runner
        .run_until(std::future::pending::<anyhow::Result<ShutdownSignal>>())
        .await;

    assert!(matches!(outcome, RunOutcome::Cancelled));
    assert!(store.worker("stale-worker").unwrap().is_stopped());
    assert!(!store.worker("live-peer").unwrap().is_stopped());
    assert_eq!(store.workers().len(), 3);
}
