//! WebSocket subscriber sessions.
//!
//! One session per connection. It registers a bounded queue with the hub,
//! then drains that queue onto the socket until the peer goes away, a write
//! fails or times out, or the hub closes the queue during shutdown.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at, timeout};

use soilgate_app::hub::BroadcastHub;
use soilgate_domain::event::OutboundEvent;
use soilgate_domain::id::SubscriberId;

use crate::state::AppState;

/// `GET /ws` — upgrade to a WebSocket subscriber session.
pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.max_message_size(state.config.max_message_bytes)
        .on_upgrade(move |socket| {
            let sessions = state.sessions.clone();
            sessions.spawn(run(socket, state));
            std::future::ready(())
        })
}

/// Hub registration that is dropped with the session, however it ends.
struct Subscription {
    hub: Arc<BroadcastHub>,
    id: SubscriberId,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.id);
    }
}

/// Why a session ended.
#[derive(Debug)]
enum SessionEnd {
    /// The hub dropped our queue (shutdown, or we fell behind).
    QueueClosed,
    /// The peer closed the connection.
    PeerClosed,
    WriteTimeout,
    Transport(axum::Error),
}

async fn run(socket: WebSocket, state: AppState) {
    let config = state.config.as_ref();

    let (tx, mut queue) = mpsc::channel(config.queue_capacity.max(1));
    let subscription = match state.hub.subscribe(tx) {
        Ok(id) => Subscription {
            hub: Arc::clone(&state.hub),
            id,
        },
        Err(err) => {
            tracing::debug!(%err, "refusing subscriber");
            let mut socket = socket;
            let _ = timeout(config.write_timeout, socket.send(Message::Close(None))).await;
            return;
        }
    };

    let id = subscription.id;
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut ping = idle_pings(config.ping_interval);

    let end = loop {
        tokio::select! {
            event = queue.recv() => {
                let Some(event) = event else {
                    break SessionEnd::QueueClosed;
                };
                if let Err(end) = send_event(&mut ws_tx, &event, config.write_timeout).await {
                    break end;
                }
            }
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    tracing::debug!(subscriber = %id, len = text.len(), "ignoring inbound text frame");
                }
                Some(Ok(Message::Binary(data))) => {
                    tracing::debug!(subscriber = %id, len = data.len(), "ignoring inbound binary frame");
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => break SessionEnd::PeerClosed,
                Some(Err(err)) => break SessionEnd::Transport(err),
            },
            () = next_ping(&mut ping) => {
                if let Err(end) = write(&mut ws_tx, Message::Ping(Bytes::new()), config.write_timeout).await {
                    break end;
                }
            }
        }
    };

    drop(subscription);
    log_end(id, &end);

    if !matches!(end, SessionEnd::PeerClosed | SessionEnd::Transport(_)) {
        let _ = timeout(config.write_timeout, ws_tx.send(Message::Close(None))).await;
    }
}

/// Ping timer, or `None` when idle pings are disabled by a zero period.
fn idle_pings(period: Duration) -> Option<Interval> {
    if period.is_zero() {
        return None;
    }
    let mut ping = interval_at(Instant::now() + period, period);
    ping.set_missed_tick_behavior(MissedTickBehavior::Skip);
    Some(ping)
}

async fn next_ping(ping: &mut Option<Interval>) {
    match ping {
        Some(ping) => {
            ping.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn send_event(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    event: &OutboundEvent,
    limit: Duration,
) -> Result<(), SessionEnd> {
    match event.to_json() {
        Ok(json) => write(ws_tx, Message::Text(json.into()), limit).await,
        Err(err) => {
            tracing::warn!(%err, "failed to encode outbound event, skipping");
            Ok(())
        }
    }
}

async fn write(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    message: Message,
    limit: Duration,
) -> Result<(), SessionEnd> {
    match timeout(limit, ws_tx.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(SessionEnd::Transport(err)),
        Err(_) => Err(SessionEnd::WriteTimeout),
    }
}

fn log_end(id: SubscriberId, end: &SessionEnd) {
    match end {
        SessionEnd::QueueClosed => {
            tracing::debug!(subscriber = %id, "session queue closed by hub");
        }
        SessionEnd::PeerClosed => {
            tracing::debug!(subscriber = %id, "session closed by peer");
        }
        SessionEnd::WriteTimeout => {
            tracing::warn!(subscriber = %id, "session write timed out");
        }
        SessionEnd::Transport(err) => {
            tracing::warn!(subscriber = %id, %err, "session transport error");
        }
    }
}
