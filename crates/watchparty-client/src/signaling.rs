//! WebSocket connection to the relay.
//!
//! The socket is split into a writer task fed by an outbound queue of
//! [`ClientEvent`]s and a reader task that decodes [`ServerEvent`]s. The
//! reader always finishes with [`SignalingEvent::Disconnected`].

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};
use watchparty_common::{ClientEvent, ServerEvent, SignalingError};

#[derive(Debug, Clone, PartialEq)]
pub enum SignalingEvent {
    Server(ServerEvent),
    Disconnected,
}

pub struct SignalingClient {
    outbox: mpsc::Sender<ClientEvent>,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl SignalingClient {
    /// Connect to `url`, giving up after `timeout`.
    pub async fn connect(
        url: &str,
        timeout: Duration,
    ) -> Result<(Self, mpsc::Receiver<SignalingEvent>), SignalingError> {
        info!(url, "Connecting to relay");

        let ws_stream = match tokio::time::timeout(timeout, tokio_tungstenite::connect_async(url)).await {
            Ok(Ok((ws_stream, _))) => ws_stream,
            Ok(Err(e)) => return Err(SignalingError::Connect(e.to_string())),
            Err(_elapsed) => return Err(SignalingError::Timeout(timeout.as_secs())),
        };

        let (mut ws_write, mut ws_read) = ws_stream.split();
        let (outbox, mut outbox_rx) = mpsc::channel::<ClientEvent>(256);
        let (event_tx, event_rx) = mpsc::channel::<SignalingEvent>(256);

        let writer = tokio::spawn(async move {
            while let Some(event) = outbox_rx.recv().await {
                let json = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(error = %e, "Failed to encode client event");
                        continue;
                    }
                };
                if ws_write.send(WsMessage::Text(json.into())).await.is_err() {
                    break;
                }
            }
            let _ = ws_write.send(WsMessage::Close(None)).await;
        });

        let reader = tokio::spawn(async move {
            while let Some(frame) = ws_read.next().await {
                match frame {
                    Ok(WsMessage::Text(text)) => match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(event) => {
                            if event_tx.send(SignalingEvent::Server(event)).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => debug!(error = %e, "Unrecognized message from relay"),
                    },
                    Ok(WsMessage::Close(_)) => {
                        info!("Relay closed connection");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
            let _ = event_tx.send(SignalingEvent::Disconnected).await;
        });

        Ok((
            Self {
                outbox,
                writer,
                reader,
            },
            event_rx,
        ))
    }

    /// A clonable handle onto the outbound queue.
    pub fn sender(&self) -> mpsc::Sender<ClientEvent> {
        self.outbox.clone()
    }

    pub async fn send(&self, event: ClientEvent) -> Result<(), SignalingError> {
        self.outbox
            .send(event)
            .await
            .map_err(|_| SignalingError::Closed)
    }

    /// Drop the connection without waiting for queued events.
    pub fn close(&self) {
        self.writer.abort();
        self.reader.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use watchparty_common::UserProfile;
    use watchparty_relay::{serve, Hub, PresenceConfig};

    async fn start_relay() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, Hub::new(PresenceConfig::default(), 256)));
        format!("ws://{addr}")
    }

    async fn next(rx: &mut mpsc::Receiver<SignalingEvent>) -> SignalingEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn connect_receives_welcome_and_joins() {
        let url = start_relay().await;
        let (client, mut rx) = SignalingClient::connect(&url, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(matches!(
            next(&mut rx).await,
            SignalingEvent::Server(ServerEvent::Welcome { .. })
        ));

        client
            .send(ClientEvent::JoinRoom {
                room_id: "R1".into(),
                user: UserProfile::new("Al", ""),
            })
            .await
            .unwrap();
        assert_eq!(
            next(&mut rx).await,
            SignalingEvent::Server(ServerEvent::RoomUsers { users: vec![] })
        );
        assert_eq!(
            next(&mut rx).await,
            SignalingEvent::Server(ServerEvent::ChatHistory { messages: vec![] })
        );
    }

    #[tokio::test]
    async fn unreachable_relay_is_a_connect_error() {
        // Bind then drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = SignalingClient::connect(&format!("ws://{addr}"), Duration::from_secs(5)).await;
        assert!(matches!(result, Err(SignalingError::Connect(_))));
    }

    #[tokio::test]
    async fn close_reports_closed_on_send() {
        let url = start_relay().await;
        let (client, _rx) = SignalingClient::connect(&url, Duration::from_secs(5))
            .await
            .unwrap();
        client.close();
        // Give the aborted writer a moment to drop its receiver.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(matches!(
            client.send(ClientEvent::Health).await,
            Err(SignalingError::Closed)
        ));
    }
}
