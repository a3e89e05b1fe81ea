//! watchparty-relay: presence, signaling relay and room broadcasts for
//! watch-party rooms.
//!
//! Clients connect over WebSocket, join a room, and exchange chat, reactions
//! and WebRTC negotiation messages through the relay. The relay never
//! inspects negotiation payloads; media flows peer to peer.

pub mod broadcaster;
pub mod connection;
pub mod hub;
pub mod presence;
pub mod signaling;

pub use hub::Hub;
pub use presence::{JoinOutcome, Participant, PresenceConfig, PresenceStore, Room};

use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;

use crate::connection::handle_connection;

/// Accept connections forever, one task per client.
pub async fn serve(listener: TcpListener, hub: Hub) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let hub = hub.clone();
                tokio::spawn(async move {
                    match accept_async(stream).await {
                        Ok(ws) => handle_connection(ws, addr, hub).await,
                        Err(e) => {
                            tracing::warn!(peer = %addr, error = %e, "WS handshake failed");
                        }
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "TCP accept error");
            }
        }
    }
}
