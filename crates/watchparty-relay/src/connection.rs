//! Per-connection handler: register, then pump events both ways.

use std::net::SocketAddr;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use watchparty_common::{ClientEvent, ConnectionId, ServerEvent};

use crate::hub::Hub;

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Handle a single WebSocket connection until it closes.
pub async fn handle_connection(ws: WebSocketStream<TcpStream>, addr: SocketAddr, hub: Hub) {
    let (mut sink, mut stream) = ws.split();
    let (connection_id, mut rx) = hub.register().await;

    tracing::info!(peer = %addr, connection = %connection_id, "Client connected");

    loop {
        tokio::select! {
            // Queued events for this client -> its WebSocket
            Some(event) = rx.recv() => {
                if send_event(&mut sink, &event).await.is_err() {
                    break;
                }
            }

            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientEvent>(&text) {
                            Ok(event) => dispatch(&hub, &connection_id, event).await,
                            Err(e) => {
                                tracing::debug!(connection = %connection_id, error = %e, "Malformed frame");
                                hub.send_to(
                                    &connection_id,
                                    ServerEvent::Error {
                                        message: format!("malformed message: {e}"),
                                    },
                                )
                                .await;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(peer = %addr, error = %e, "WS error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    tracing::info!(peer = %addr, connection = %connection_id, "Client disconnected");
    hub.disconnect(&connection_id).await;
}

/// Route one client event to the hub.
pub async fn dispatch(hub: &Hub, connection_id: &ConnectionId, event: ClientEvent) {
    match event {
        ClientEvent::JoinRoom { room_id, user } => {
            hub.join_room(connection_id, &room_id, user).await;
        }
        ClientEvent::LeaveRoom => {
            hub.leave_room(connection_id).await;
        }
        ClientEvent::Signal { target, signal } => {
            hub.relay(connection_id, &target, signal).await;
        }
        ClientEvent::ChatMessage { room_id, text, user } => {
            hub.broadcast_chat(connection_id, &room_id, text, user).await;
        }
        ClientEvent::Reaction { room_id, emoji } => {
            hub.broadcast_reaction(connection_id, &room_id, emoji).await;
        }
        ClientEvent::Buzz { room_id } => {
            hub.broadcast_buzz(connection_id, &room_id).await;
        }
        ClientEvent::HandToggle { room_id, is_raised } => {
            hub.broadcast_hand_toggle(connection_id, &room_id, is_raised).await;
        }
        ClientEvent::Health => {
            let health = hub.health().await;
            hub.send_to(connection_id, health).await;
        }
    }
}

/// Send a server event as a JSON text frame.
async fn send_event(
    sink: &mut WsSink,
    event: &ServerEvent,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode server event");
            return Ok(());
        }
    };
    sink.send(Message::Text(json.into())).await
}
