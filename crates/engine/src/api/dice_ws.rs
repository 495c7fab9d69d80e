//! The dice push channel.
//!
//! One producer (any skill-check resolution, plus state-refresh
//! notifications), N WebSocket subscribers. Every subscriber gets a bounded
//! buffer; a subscriber that cannot keep up is dropped rather than allowed
//! to stall the pipeline.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use keeper_shared::ServerMessage;

use crate::app::App;
use crate::infrastructure::ports::DiceSinkPort;

/// Frames buffered per subscriber before it is considered non-responsive.
const SUBSCRIBER_BUFFER: usize = 32;

/// Fan-out hub behind `/ws/dice`.
#[derive(Default)]
pub struct DiceHub {
    subscribers: DashMap<Uuid, mpsc::Sender<ServerMessage>>,
}

impl DiceHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> (Uuid, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = Uuid::new_v4();
        self.subscribers.insert(id, tx);
        tracing::debug!(subscriber = %id, "Dice subscriber connected");
        (id, rx)
    }

    pub fn unsubscribe(&self, id: Uuid) {
        if self.subscribers.remove(&id).is_some() {
            tracing::debug!(subscriber = %id, "Dice subscriber disconnected");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl DiceSinkPort for DiceHub {
    fn push(&self, message: ServerMessage) {
        let mut dead = Vec::new();
        for entry in self.subscribers.iter() {
            if let Err(err) = entry.value().try_send(message.clone()) {
                tracing::warn!(
                    subscriber = %entry.key(),
                    error = %err,
                    "Dropping non-responsive dice subscriber"
                );
                dead.push(*entry.key());
            }
        }
        for id in dead {
            self.subscribers.remove(&id);
        }
    }
}

/// `GET /ws/dice` upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app): State<Arc<App>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_subscriber(socket, app))
}

async fn serve_subscriber(socket: WebSocket, app: Arc<App>) {
    let (id, mut rx) = app.dice_hub.subscribe();
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            frame = rx.recv() => {
                let Some(frame) = frame else { break };
                let Ok(text) = serde_json::to_string(&frame) else { continue };
                if sink.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            incoming = stream.next() => {
                // Clients only ever close or ping; anything else is ignored.
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }

    app.dice_hub.unsubscribe(id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slow_subscribers_are_dropped_without_blocking() {
        let hub = DiceHub::new();
        let (_id, _rx) = hub.subscribe();
        let frame = ServerMessage::SkillCheckResult {
            skill_name: "drive".to_string(),
            dice_roll: 20,
            threshold: 30,
            success: true,
            hard_level: 2,
        };
        // Fill the buffer past capacity; the hub must never block and must
        // evict the stalled subscriber.
        for _ in 0..(SUBSCRIBER_BUFFER + 1) {
            hub.push(frame.clone());
        }
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn live_subscribers_receive_frames_in_order() {
        let hub = DiceHub::new();
        let (_id, mut rx) = hub.subscribe();
        for roll in [10, 20] {
            hub.push(ServerMessage::SkillCheckResult {
                skill_name: "drive".to_string(),
                dice_roll: roll,
                threshold: 30,
                success: true,
                hard_level: 1,
            });
        }
        let first = rx.recv().await.expect("first frame");
        assert!(matches!(
            first,
            ServerMessage::SkillCheckResult { dice_roll: 10, .. }
        ));
    }

    #[test]
    fn closed_subscribers_are_evicted() {
        let hub = DiceHub::new();
        let (_id, rx) = hub.subscribe();
        drop(rx);
        hub.push(ServerMessage::CharacterStateRefresh {
            character_id: "x".to_string(),
            timestamp: 0,
        });
        assert_eq!(hub.subscriber_count(), 0);
    }
}
