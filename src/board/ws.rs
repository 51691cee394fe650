use std::time::Duration;

use axum::{
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::api::{Actor, ApiError, SharedState};
use super::bus::{BusFrame, Subscription};

/// How often to send WebSocket Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a Pong response before considering the connection dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

/// Upgrade to a live feed of one board. The actor must be able to view it;
/// the check happens before the upgrade so refusals are plain HTTP errors.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
    Actor(actor): Actor,
    Path(board_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let subscription = state.coordinator.subscribe(actor, board_id).await?;
    debug!(board_id, actor, "Observer connected");
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, subscription)))
}

async fn handle_socket(socket: WebSocket, subscription: Subscription) {
    let (sender, receiver) = socket.split();
    run_socket_loop(sender, receiver, subscription).await;
}

/// Text frame for a bus frame: `{"type": ..., "payload": {...}}`.
///
/// A lagged feed becomes a `Resync` frame; the client should refetch the
/// board snapshot.
pub fn frame_text(frame: &BusFrame) -> serde_json::Result<String> {
    match frame {
        BusFrame::Event(event) => Ok(event.to_frame()?.to_string()),
        BusFrame::Heartbeat => Ok(serde_json::json!({"type": "Heartbeat", "payload": {}}).to_string()),
        BusFrame::Lagged { missed } => {
            Ok(serde_json::json!({"type": "Resync", "payload": {"missed": missed}}).to_string())
        }
    }
}

/// Forward board events to the socket until either side goes away.
///
/// Pings every [`PING_INTERVAL`]; if no Pong arrives within
/// [`PONG_TIMEOUT`] the connection is treated as dead. Dropping the
/// subscription on exit detaches it from the bus.
async fn run_socket_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut subscription: Subscription,
) {
    let board_id = subscription.board_id();
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    // The first tick completes immediately.
    ping_interval.tick().await;

    let mut last_pong = Instant::now();
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if awaiting_pong && last_pong.elapsed() > PONG_TIMEOUT {
                    debug!(board_id, "Pong timeout; dropping observer");
                    break;
                }
                if sender.send(Message::Ping(Default::default())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
            }

            frame = subscription.next() => {
                let Some(frame) = frame else {
                    // Bus shut down.
                    break;
                };
                let text = match frame_text(&frame) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(board_id, error = %e, "Failed to serialize event frame");
                        continue;
                    }
                };
                if sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {
                        // Observers are read-only.
                    }
                    Some(Err(_)) => break,
                }
            }
        }
    }

    let _ = sender.send(Message::Close(None)).await;
    debug!(board_id, "Observer disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::events::{Change, MutationEvent, Origin};
    use std::sync::Arc;

    #[test]
    fn test_heartbeat_frame() {
        let text = frame_text(&BusFrame::Heartbeat).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "Heartbeat");
        assert!(value["payload"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_event_frame() {
        let event = MutationEvent {
            board_id: 4,
            origin: Origin::Actor { user_id: 1 },
            change: Change::CardDeleted { card_id: 8 },
        };
        let text = frame_text(&BusFrame::Event(Arc::new(event))).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "CardDeleted");
        assert_eq!(value["payload"]["card_id"], 8);
        assert_eq!(value["payload"]["board_id"], 4);
    }

    #[test]
    fn test_lagged_frame_asks_for_resync() {
        let text = frame_text(&BusFrame::Lagged { missed: 12 }).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "Resync");
        assert_eq!(value["payload"]["missed"], 12);
    }

    #[test]
    fn test_keepalive_constants() {
        // A ping must get a full interval to be answered before the next check.
        assert!(PONG_TIMEOUT > PING_INTERVAL);
    }
}
