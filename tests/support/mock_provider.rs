use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::TcpListener,
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

/// Minimal NDJSON stream provider: records each subscribe line, writes its events, then holds
/// the connection open until the client goes away.
pub struct MockProvider {
    addr: SocketAddr,
    subscriptions: Arc<Mutex<Vec<Value>>>,
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl MockProvider {
    pub async fn start(events: Vec<Value>) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind mock provider")?;
        let addr = listener.local_addr()?;
        let subscriptions = Arc::new(Mutex::new(Vec::new()));
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn({
            let subscriptions = subscriptions.clone();
            let shutdown = shutdown.clone();
            async move {
                loop {
                    let socket = tokio::select! {
                        _ = shutdown.cancelled() => return,
                        accepted = listener.accept() => match accepted {
                            Ok((socket, _)) => socket,
                            Err(_) => return,
                        },
                    };
                    tokio::spawn(serve_connection(
                        socket,
                        events.clone(),
                        subscriptions.clone(),
                        shutdown.clone(),
                    ));
                }
            }
        });

        Ok(Self {
            addr,
            subscriptions,
            shutdown,
            handle,
        })
    }

    pub fn addr(&self) -> String {
        self.addr.to_string()
    }

    pub fn subscriptions(&self) -> Vec<Value> {
        self.subscriptions.lock().unwrap().clone()
    }

    pub async fn shutdown(self) {
        self.shutdown.cancel();
        let _ = self.handle.await;
    }
}

async fn serve_connection(
    socket: tokio::net::TcpStream,
    events: Vec<Value>,
    subscriptions: Arc<Mutex<Vec<Value>>>,
    shutdown: CancellationToken,
) {
    let (read_half, mut write_half) = socket.into_split();
    let mut reader = BufReader::new(read_half);

    let mut subscribe = String::new();
    if reader.read_line(&mut subscribe).await.unwrap_or(0) == 0 {
        return;
    }
    if let Ok(value) = serde_json::from_str(&subscribe) {
        subscriptions.lock().unwrap().push(value);
    }

    for event in events {
        let line = format!("{event}\n");
        if write_half.write_all(line.as_bytes()).await.is_err() {
            return;
        }
    }
    // Keep-alive so the client sees a live but quiet connection.
    let _ = write_half.write_all(b"\n").await;

    let mut rest = String::new();
    tokio::select! {
        _ = shutdown.cancelled() => {}
        _ = reader.read_line(&mut rest) => {}
    }
}
