//! Streaming worker binary.
//!
//! ```bash
//! termstream primary --data-dir ./data --source 127.0.0.1:9400 --poll-interval 10
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use termstream::runtime::config::{
    DEFAULT_MAX_CONSECUTIVE_ERRORS, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_RETRY_COOLDOWN_SECS,
};
use termstream::stream::ndjson::DEFAULT_CONNECT_TIMEOUT;
use termstream::{init_tracing, FileStore, NdjsonConnector, Runner, Stores, WorkerConfig};

/// Ingests a term-filtered event stream into batched storage.
#[derive(Parser, Debug)]
#[command(name = "termstream")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Credentials to stream with; the first configured set when omitted.
    credentials_name: Option<String>,

    /// Seconds between maintenance ticks.
    #[arg(long, env = "TERMSTREAM_POLL_INTERVAL", default_value_t = DEFAULT_POLL_INTERVAL_SECS)]
    poll_interval: u64,

    /// Directory holding terms, credentials, events, and worker records.
    #[arg(long, env = "TERMSTREAM_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Provider address as host:port.
    #[arg(long, env = "TERMSTREAM_SOURCE")]
    source: String,

    /// Seconds allowed for the provider's TCP handshake.
    #[arg(long, env = "TERMSTREAM_CONNECT_TIMEOUT", default_value_t = DEFAULT_CONNECT_TIMEOUT.as_secs())]
    connect_timeout: u64,

    /// Seconds to wait after a failed connection before retrying.
    #[arg(long, env = "TERMSTREAM_RETRY_COOLDOWN", default_value_t = DEFAULT_RETRY_COOLDOWN_SECS)]
    retry_cooldown: u64,

    /// Stream errors tolerated before the worker stops for good.
    #[arg(long, env = "TERMSTREAM_MAX_ERRORS", default_value_t = DEFAULT_MAX_CONSECUTIVE_ERRORS)]
    max_errors: u32,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let mut builder = WorkerConfig::builder()
        .poll_interval(Duration::from_secs(cli.poll_interval))
        .retry_cooldown(Duration::from_secs(cli.retry_cooldown))
        .max_consecutive_errors(cli.max_errors);
    if let Some(name) = &cli.credentials_name {
        builder = builder.credentials_name(name.as_str());
    }
    let config = match builder.build() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "invalid configuration");
            return ExitCode::from(1);
        }
    };

    let store = match FileStore::open(cli.data_dir).await {
        Ok(store) => Arc::new(store),
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "failed to open data directory");
            return ExitCode::from(1);
        }
    };

    let connector = NdjsonConnector::new(cli.source)
        .with_connect_timeout(Duration::from_secs(cli.connect_timeout));
    let runner = Runner::new(config, Stores::from_backend(store), Arc::new(connector));
    let outcome = runner.run_until_signal().await;
    ExitCode::from(outcome.exit_code())
}
