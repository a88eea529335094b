use super::transport::{
    DisconnectDirective, EventSink, StreamConnector, SubscriptionError, SubscriptionRequest,
};
use crate::model::StreamEvent;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connects to a provider speaking newline-delimited JSON over TCP.
///
/// The first line sent is the subscription; every line received afterwards is an event, a
/// disconnect notice, or an empty keep-alive.
#[derive(Debug, Clone)]
pub struct NdjsonConnector {
    addr: String,
    connect_timeout: Duration,
}

#[derive(Serialize)]
struct SubscribeMessage<'a> {
    track: &'a [String],
    auth: SubscribeAuth<'a>,
}

#[derive(Serialize)]
struct SubscribeAuth<'a> {
    key: &'a str,
    token: &'a str,
}

#[derive(Debug)]
enum Frame {
    KeepAlive,
    Event(StreamEvent),
    Disconnect { code: u16, reason: String },
}

impl NdjsonConnector {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl StreamConnector for NdjsonConnector {
    fn connect(
        &self,
        request: SubscriptionRequest,
        sink: Arc<dyn EventSink>,
        shutdown: CancellationToken,
    ) -> BoxFuture<'static, Result<()>> {
        let connector = self.clone();
        Box::pin(async move { connector.run(request, sink, shutdown).await })
    }
}

impl NdjsonConnector {
    async fn open(&self) -> Result<TcpStream> {
        match timeout(self.connect_timeout, TcpStream::connect(self.addr.as_str())).await {
            Ok(connected) => connected
                .with_context(|| format!("failed to connect to stream provider at {}", self.addr)),
            Err(_) => Err(SubscriptionError::ConnectTimeout {
                addr: self.addr.clone(),
            }
            .into()),
        }
    }

    async fn run(
        &self,
        request: SubscriptionRequest,
        sink: Arc<dyn EventSink>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let stream = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            opened = self.open() => opened?,
        };
        let (read_half, mut write_half) = stream.into_split();

        let mut subscribe = serde_json::to_string(&SubscribeMessage {
            track: &request.terms,
            auth: SubscribeAuth {
                key: &request.credentials.api_key,
                token: &request.credentials.access_token,
            },
        })
        .context("failed to encode subscription")?;
        subscribe.push('\n');
        write_half
            .write_all(subscribe.as_bytes())
            .await
            .context("failed to send subscription")?;

        tracing::debug!(
            target: "termstream::driver",
            addr = %self.addr,
            terms = request.terms.len(),
            "stream connection open"
        );

        let mut reader = BufReader::new(read_half);
        let mut line = Vec::new();
        loop {
            line.clear();
            let read = tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                read = reader.read_until(b'\n', &mut line) => {
                    read.context("failed to read from stream provider")?
                }
            };
            if read == 0 {
                tracing::debug!(target: "termstream::driver", "stream provider closed the connection");
                return Ok(());
            }

            // Undecodable bytes are a bad line, not a broken connection.
            let frame = std::str::from_utf8(&line)
                .context("line is not valid UTF-8")
                .and_then(|text| parse_frame(text));
            match frame {
                Ok(Frame::KeepAlive) => {}
                Ok(Frame::Event(event)) => sink.on_event(event),
                Ok(Frame::Disconnect { code, reason }) => {
                    return match sink.on_disconnect(code, &reason) {
                        DisconnectDirective::Reconnect => Ok(()),
                        DisconnectDirective::Stop => {
                            Err(SubscriptionError::Disconnected { code, reason }.into())
                        }
                    };
                }
                Err(err) => tracing::warn!(
                    target: "termstream::driver",
                    error = %format!("{err:#}"),
                    "skipping malformed stream line"
                ),
            }
        }
    }
}

fn parse_frame(line: &str) -> Result<Frame> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(Frame::KeepAlive);
    }

    let value: Value = serde_json::from_str(trimmed).context("line is not valid JSON")?;
    let Value::Object(fields) = &value else {
        anyhow::bail!("expected a JSON object, got {trimmed}");
    };

    if let Some(Value::Object(notice)) = fields.get("disconnect") {
        let code = notice
            .get("code")
            .and_then(Value::as_u64)
            .map_or(0, |code| u16::try_from(code).unwrap_or(u16::MAX));
        let reason = notice
            .get("reason")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        return Ok(Frame::Disconnect { code, reason });
    }

    Ok(Frame::Event(StreamEvent::new(value)))
}
