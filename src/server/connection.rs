use futures::SinkExt;
use futures::StreamExt;
use tokio::time::sleep_until;
use tokio::time::timeout;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;
use warp::ws::Message;
use warp::ws::WebSocket;

use crate::constants::CONNECTION_ID_LEN;
use crate::metrics::CONNECTIONS_CLOSED;
use crate::metrics::MESSAGES_SENT;
use crate::ConfigObject;
use crate::KeepaliveConfig;
use crate::Subscription;

/// Why a streaming connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CloseReason {
    Shutdown,
    PeerClosed,
    LivenessTimeout,
    WriteTimeout,
    TransportError,
    Encode,
}

impl CloseReason {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Shutdown => "shutdown",
            CloseReason::PeerClosed => "peer_closed",
            CloseReason::LivenessTimeout => "liveness_timeout",
            CloseReason::WriteTimeout => "write_timeout",
            CloseReason::TransportError => "transport_error",
            CloseReason::Encode => "encode",
        }
    }
}

/// Server side of one streaming subscriber
///
/// The connection owns its [`Subscription`]: whichever way the session ends,
/// dropping the connection unregisters it from the dispatcher once.
#[derive(Debug)]
pub(crate) struct Connection<C: ConfigObject> {
    conn_id: String,
    node: Option<String>,
    subscription: Subscription<C>,
    keepalive: KeepaliveConfig,
    shutdown: CancellationToken,
}

impl<C: ConfigObject> Connection<C> {
    pub(crate) fn new(
        subscription: Subscription<C>,
        node: Option<String>,
        keepalive: KeepaliveConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            conn_id: nanoid::nanoid!(CONNECTION_ID_LEN),
            node,
            subscription,
            keepalive,
            shutdown,
        }
    }

    pub(crate) async fn run(
        self,
        socket: WebSocket,
    ) {
        info!(
            conn_id = %self.conn_id,
            node = ?self.node,
            filter = %self.subscription.filter(),
            "watch connection open"
        );

        let reason = self.serve(socket).await;

        CONNECTIONS_CLOSED.with_label_values(&[reason.as_str()]).inc();
        info!(
            conn_id = %self.conn_id,
            reason = reason.as_str(),
            "watch connection closed"
        );
    }

    async fn serve(
        &self,
        socket: WebSocket,
    ) -> CloseReason {
        let (mut tx, mut rx) = socket.split();
        let write_wait = self.keepalive.write_wait();
        let pong_wait = self.keepalive.pong_wait();

        let mut ping = tokio::time::interval_at(
            Instant::now() + self.keepalive.ping_period(),
            self.keepalive.ping_period(),
        );
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_seen = Instant::now();

        let reason = loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    break CloseReason::Shutdown;
                }

                _ = sleep_until(last_seen + pong_wait) => {
                    warn!(conn_id = %self.conn_id, ?pong_wait, "peer missed liveness window");
                    break CloseReason::LivenessTimeout;
                }

                _ = ping.tick() => {
                    match timeout(write_wait, tx.send(Message::ping(Vec::new()))).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            debug!(conn_id = %self.conn_id, "ping failed: {e}");
                            break CloseReason::TransportError;
                        }
                        Err(_) => break CloseReason::WriteTimeout,
                    }
                }

                entry = self.subscription.next() => {
                    let text = match serde_json::to_string(&entry) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(conn_id = %self.conn_id, id = %entry.id, "failed to encode entry: {e}");
                            break CloseReason::Encode;
                        }
                    };
                    match timeout(write_wait, tx.send(Message::text(text))).await {
                        Ok(Ok(())) => {
                            MESSAGES_SENT.inc();
                            debug!(conn_id = %self.conn_id, id = %entry.id, "entry sent");
                        }
                        Ok(Err(e)) => {
                            debug!(conn_id = %self.conn_id, "send failed: {e}");
                            break CloseReason::TransportError;
                        }
                        Err(_) => {
                            warn!(conn_id = %self.conn_id, ?write_wait, "write deadline exceeded");
                            break CloseReason::WriteTimeout;
                        }
                    }
                }

                frame = rx.next() => {
                    match frame {
                        Some(Ok(msg)) if msg.is_close() => break CloseReason::PeerClosed,
                        Some(Ok(_)) => last_seen = Instant::now(),
                        Some(Err(e)) => {
                            debug!(conn_id = %self.conn_id, "read failed: {e}");
                            break CloseReason::TransportError;
                        }
                        None => break CloseReason::PeerClosed,
                    }
                }
            }
        };

        if matches!(reason, CloseReason::Shutdown | CloseReason::LivenessTimeout) {
            let _ = timeout(write_wait, tx.send(Message::close())).await;
        }
        let _ = timeout(write_wait, tx.close()).await;

        reason
    }
}
