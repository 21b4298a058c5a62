use std::time::Duration;

use futures::SinkExt;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::sleep_until;
use tokio::time::timeout;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::MaybeTlsStream;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;
use tracing::warn;
use url::Url;

use crate::ConfigEntry;
use crate::ConfigFilter;
use crate::ConfigObject;
use crate::ConnectionError;
use crate::KeepaliveConfig;
use crate::Result;

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Client session state machine
///
/// `Disconnected → Connecting → Synced → Disconnected …`. Every transition
/// into `Synced` is followed by a full snapshot replay from the server, so
/// values already seen may be delivered again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Synced,
}

/// How a stream ended without a transport failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamEnd {
    Cancelled,
    /// First-value mode forwarded its entry
    Delivered,
    /// The consumer dropped the receiving end of `out`
    OutputClosed,
}

/// One WebSocket endpoint plus the timing used to keep it alive
#[derive(Debug, Clone)]
pub(crate) struct Session {
    url: Url,
    keepalive: KeepaliveConfig,
    connect_timeout: Duration,
}

impl Session {
    pub(crate) fn new(
        url: Url,
        keepalive: KeepaliveConfig,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            url,
            keepalive,
            connect_timeout,
        }
    }

    pub(crate) fn url(&self) -> &Url {
        &self.url
    }

    pub(crate) async fn connect(&self) -> Result<WsStream> {
        trace!(url = %self.url, "opening watch connection");

        match timeout(
            self.connect_timeout,
            tokio_tungstenite::connect_async(self.url.as_str()),
        )
        .await
        {
            Ok(Ok((ws, _response))) => Ok(ws),
            Ok(Err(e)) => Err(ConnectionError::Connect {
                target: self.url.to_string(),
                reason: e.to_string(),
            }
            .into()),
            Err(_) => Err(ConnectionError::Timeout {
                operation: "connect",
                duration: self.connect_timeout,
            }
            .into()),
        }
    }

    /// Forward streamed entries to `out` until cancelled, the consumer goes
    /// away, or the transport fails.
    ///
    /// With `first_only` the stream ends after the first forwarded entry.
    /// Transport failures, including a missed liveness window, are returned
    /// as errors.
    pub(crate) async fn stream<C: ConfigObject>(
        &self,
        ws: WsStream,
        filter: &ConfigFilter,
        token: &CancellationToken,
        out: &mpsc::Sender<ConfigEntry<C>>,
        first_only: bool,
    ) -> Result<StreamEnd> {
        let (mut tx, mut rx) = ws.split();
        let write_wait = self.keepalive.write_wait();
        let pong_wait = self.keepalive.pong_wait();

        let mut ping = tokio::time::interval_at(
            Instant::now() + self.keepalive.ping_period(),
            self.keepalive.ping_period(),
        );
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_seen = Instant::now();

        let result: Result<StreamEnd> = loop {
            tokio::select! {
                _ = token.cancelled() => break Ok(StreamEnd::Cancelled),

                _ = out.closed() => break Ok(StreamEnd::OutputClosed),

                _ = sleep_until(last_seen + pong_wait) => {
                    break Err(ConnectionError::LivenessTimeout(pong_wait).into());
                }

                _ = ping.tick() => {
                    match timeout(write_wait, tx.send(Message::Ping(Vec::new()))).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => break Err(e.into()),
                        Err(_) => break Err(ConnectionError::Timeout {
                            operation: "ping",
                            duration: write_wait,
                        }.into()),
                    }
                }

                frame = rx.next() => {
                    let text = match frame {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) | None => break Err(ConnectionError::Closed.into()),
                        Some(Ok(_)) => {
                            last_seen = Instant::now();
                            continue;
                        }
                        Some(Err(e)) => break Err(e.into()),
                    };
                    last_seen = Instant::now();

                    let entry: ConfigEntry<C> = match serde_json::from_str(&text) {
                        Ok(entry) => entry,
                        Err(e) => break Err(e.into()),
                    };
                    if !filter.matches(&entry.id) {
                        warn!(id = %entry.id, %filter, "ignoring entry outside of filter");
                        continue;
                    }
                    debug!(id = %entry.id, "entry received");

                    tokio::select! {
                        _ = token.cancelled() => break Ok(StreamEnd::Cancelled),
                        sent = out.send(entry) => {
                            if sent.is_err() {
                                break Ok(StreamEnd::OutputClosed);
                            }
                        }
                    }

                    if first_only {
                        break Ok(StreamEnd::Delivered);
                    }
                }
            }
        };

        // Best effort: the peer may already be gone
        let _ = timeout(write_wait, tx.send(Message::Close(None))).await;

        result
    }
}
