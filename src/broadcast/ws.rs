//! WebSocket endpoint for the change broadcaster
//!
//! Clients authenticate with the same access token the HTTP API uses
//! (`/api/ws?token=...`), then exchange JSON text frames:
//!
//! - client → server: `{op: subscribe|unsubscribe|ping|presence, ...}`
//! - server → client: event envelopes, heartbeats, and resync notices
//!
//! Heartbeats go out every H seconds; a connection that misses two in a row
//! is dropped. Closing the socket cancels all subscriptions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::auth::TokenKind;
use crate::http::AppState;

use super::{topics, Broadcaster, ClientHandle, EventKind, Outbound, Replay};

/// Client → server frames
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum ClientFrame {
    Subscribe {
        topics: Vec<String>,
        /// Last seen seq per topic for replay
        #[serde(default)]
        last_seq: HashMap<String, u64>,
    },
    Unsubscribe {
        topics: Vec<String>,
    },
    Ping,
    Presence {
        topic: String,
        state: String,
    },
}

/// Server → client control frames (events use the envelope directly)
#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum ServerFrame {
    Subscribed { topic: String, seq: u64 },
    ResyncRequired { topic: Option<String>, reason: String },
    Pong,
    Heartbeat,
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: String,
}

/// Upgrade handler for `GET /api/ws`
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    upgrade: WebSocketUpgrade,
) -> axum::response::Response {
    let claims = match state.tokens.verify(&query.token, TokenKind::Access) {
        Ok(claims) => claims,
        Err(_) => return StatusCode::UNAUTHORIZED.into_response(),
    };

    let broadcaster = state.broadcaster.clone();
    let heartbeat = Duration::from_secs(state.config.broadcast.heartbeat_secs);
    upgrade
        .on_upgrade(move |socket| handle_socket(socket, broadcaster, claims.sub, heartbeat))
        .into_response()
}

async fn handle_socket(
    socket: WebSocket,
    broadcaster: Arc<Broadcaster>,
    user_id: uuid::Uuid,
    heartbeat: Duration,
) {
    let (client, mut outbound) = broadcaster.connect(user_id);
    let client_id = client.id;
    tracing::debug!(client_id = %client_id, user_id = %user_id, "WebSocket connected");

    // Every client hears its own user topic
    broadcaster.subscribe(&client, &topics::user(user_id), None);

    let (mut sink, mut stream) = socket.split();
    let mut heartbeat_timer = tokio::time::interval(heartbeat);
    heartbeat_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            // Outbound events from the broadcaster
            outbound_msg = outbound.recv() => {
                let Some(msg) = outbound_msg else { break };
                let frame = match msg {
                    Outbound::Event(event) => serde_json::to_string(&event).ok(),
                    Outbound::ResyncRequired { reason } => {
                        let text = serde_json::to_string(&ServerFrame::ResyncRequired {
                            topic: None,
                            reason,
                        })
                        .ok();
                        if let Some(text) = text {
                            let _ = sink.send(Message::Text(text.into())).await;
                        }
                        break;
                    }
                    Outbound::Heartbeat => serde_json::to_string(&ServerFrame::Heartbeat).ok(),
                };
                if let Some(text) = frame {
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
            }

            // Inbound client frames
            inbound = stream.next() => {
                let Some(Ok(msg)) = inbound else { break };
                last_seen = Instant::now();
                match msg {
                    Message::Text(text) => {
                        if let Ok(frame) = serde_json::from_str::<ClientFrame>(&text) {
                            if let Some(reply) =
                                handle_frame(&broadcaster, &client, frame).await
                            {
                                for server_frame in reply {
                                    let Ok(text) = serde_json::to_string(&server_frame) else {
                                        continue;
                                    };
                                    if sink.send(Message::Text(text.into())).await.is_err() {
                                        break;
                                    }
                                }
                            }
                        }
                    }
                    Message::Ping(data) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }

            // Liveness: two missed heartbeats drop the channel
            _ = heartbeat_timer.tick() => {
                if last_seen.elapsed() > heartbeat * 2 {
                    tracing::debug!(client_id = %client_id, "Dropping unresponsive client");
                    break;
                }
                // Goes through the same bounded queue as events
                if client.sender.try_send(Outbound::Heartbeat).is_err() {
                    break;
                }
            }
        }
    }

    broadcaster.disconnect(client_id);
    tracing::debug!(client_id = %client_id, "WebSocket disconnected");
}

async fn handle_frame(
    broadcaster: &Broadcaster,
    client: &ClientHandle,
    frame: ClientFrame,
) -> Option<Vec<ServerFrame>> {
    match frame {
        ClientFrame::Subscribe {
            topics: topic_list,
            last_seq,
        } => {
            let mut replies = Vec::new();
            for topic in topic_list {
                match broadcaster.subscribe(client, &topic, last_seq.get(&topic).copied()) {
                    Replay::Events(events) => {
                        for event in events {
                            let _ = client.sender.try_send(Outbound::Event(event));
                        }
                        replies.push(ServerFrame::Subscribed {
                            seq: broadcaster.current_seq(&topic),
                            topic,
                        });
                    }
                    Replay::ResyncRequired => {
                        replies.push(ServerFrame::ResyncRequired {
                            topic: Some(topic),
                            reason: "replay window exceeded".to_string(),
                        });
                    }
                }
            }
            Some(replies)
        }
        ClientFrame::Unsubscribe { topics: topic_list } => {
            for topic in topic_list {
                broadcaster.unsubscribe(client.id, &topic);
            }
            None
        }
        ClientFrame::Ping => Some(vec![ServerFrame::Pong]),
        ClientFrame::Presence { topic, state } => {
            let kind = match state.as_str() {
                "typing" => EventKind::PresenceTyping,
                "editing" => EventKind::PresenceEditing,
                _ => EventKind::PresenceIdle,
            };
            broadcaster.publish(
                &topic,
                kind,
                serde_json::json!({ "user_id": client.user_id, "state": state }),
            );
            None
        }
    }
}
