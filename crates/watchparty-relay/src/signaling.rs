//! Signaling relay: forward negotiation payloads to one named connection.
//!
//! The relay never inspects the payload. A target that is gone means the
//! signal is dropped without telling the sender; peers recover through their
//! own renegotiation.

use tracing::debug;
use watchparty_common::{ConnectionId, ServerEvent, SignalPayload};

use crate::hub::Hub;

impl Hub {
    /// Forward `signal` from `sender` to `target`. Returns whether it was queued.
    pub async fn relay(
        &self,
        sender: &ConnectionId,
        target: &ConnectionId,
        signal: SignalPayload,
    ) -> bool {
        if sender == target {
            debug!(connection = %sender, "Ignoring signal addressed to self");
            return false;
        }

        let state = self.state.read().await;
        if !state.connections.contains_key(target) {
            debug!(
                sender = %sender,
                target = %target,
                kind = signal.kind(),
                "Relay target gone, dropping signal"
            );
            return false;
        }

        state.deliver(
            target,
            ServerEvent::Signal {
                sender: sender.clone(),
                signal,
            },
        )
    }
}
