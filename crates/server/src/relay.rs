//! Call-signaling relay.
//!
//! Pure point-to-point forwarding keyed by target identity, with the sender
//! attached as provenance so the receiver knows who to address in its reply.
//! The relay holds no call state: termination, double answers and stray ICE
//! candidates are all forwarded unconditionally, and the client's call
//! session machine is responsible for tolerating them.

use std::sync::Arc;

use patter_shared::{ClientCommand, ServerEvent};

use crate::presence::PresenceRegistry;

pub struct SignalingRelay {
    registry: Arc<PresenceRegistry>,
}

impl SignalingRelay {
    pub fn new(registry: Arc<PresenceRegistry>) -> Self {
        Self { registry }
    }

    /// Forward a call-control command from `from`. Returns silently when the
    /// target is offline; the caller sees no failure event.
    pub async fn forward(&self, from: &str, command: ClientCommand) {
        let (target_id, event) = match command {
            ClientCommand::CallUser { target_id, offer } => (
                target_id,
                ServerEvent::IncomingCall {
                    from: from.to_string(),
                    offer,
                },
            ),
            ClientCommand::AnswerCall { target_id, answer } => (
                target_id,
                ServerEvent::CallAccepted {
                    from: from.to_string(),
                    answer,
                },
            ),
            ClientCommand::IceCandidate {
                target_id,
                candidate,
            } => (
                target_id,
                ServerEvent::IceCandidate {
                    from: from.to_string(),
                    candidate,
                },
            ),
            ClientCommand::EndCall { target_id } => (
                target_id,
                ServerEvent::CallEnded {
                    from: from.to_string(),
                },
            ),
            // Room management is handled before the relay is consulted.
            ClientCommand::JoinGroup { .. } | ClientCommand::LeaveGroup { .. } => return,
        };

        match self.registry.lookup(&target_id).await {
            Some(handle) => {
                tracing::debug!(from, %target_id, "forwarding signaling event");
                handle.send(event);
            }
            None => tracing::debug!(from, %target_id, "signaling event dropped, target offline"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patter_shared::WsEnvelope;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    use crate::presence::ConnectionHandle;

    fn fake_connection() -> (
        ConnectionHandle,
        mpsc::UnboundedReceiver<WsEnvelope<ServerEvent>>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionHandle::new(Uuid::new_v4(), tx), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<WsEnvelope<ServerEvent>>) -> Vec<ServerEvent> {
        let mut out = Vec::new();
        while let Ok(envelope) = rx.try_recv() {
            if !matches!(envelope.payload, ServerEvent::GetOnlineUsers { .. }) {
                out.push(envelope.payload);
            }
        }
        out
    }

    #[tokio::test]
    async fn test_call_initiation_forwarded_with_provenance() {
        let registry = Arc::new(PresenceRegistry::new());
        let relay = SignalingRelay::new(registry.clone());
        let (handle, mut rx) = fake_connection();
        registry.register("u2", handle).await;

        relay
            .forward(
                "u1",
                ClientCommand::CallUser {
                    target_id: "u2".to_string(),
                    offer: serde_json::json!({"sdp": "v=0"}),
                },
            )
            .await;

        match drain(&mut rx).pop().unwrap() {
            ServerEvent::IncomingCall { from, offer } => {
                assert_eq!(from, "u1");
                assert_eq!(offer["sdp"], "v=0");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_call_to_unregistered_target_is_dropped() {
        let registry = Arc::new(PresenceRegistry::new());
        let relay = SignalingRelay::new(registry.clone());
        let (caller, mut caller_rx) = fake_connection();
        registry.register("u1", caller).await;

        relay
            .forward(
                "u1",
                ClientCommand::CallUser {
                    target_id: "u2".to_string(),
                    offer: serde_json::json!({}),
                },
            )
            .await;

        // The caller receives no error event.
        assert!(drain(&mut caller_rx).is_empty());
    }

    #[tokio::test]
    async fn test_ice_candidates_forwarded_in_order() {
        let registry = Arc::new(PresenceRegistry::new());
        let relay = SignalingRelay::new(registry.clone());
        let (handle, mut rx) = fake_connection();
        registry.register("u1", handle).await;

        for i in 0..2 {
            relay
                .forward(
                    "u2",
                    ClientCommand::IceCandidate {
                        target_id: "u1".to_string(),
                        candidate: serde_json::json!({"n": i}),
                    },
                )
                .await;
        }

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        for (i, event) in events.into_iter().enumerate() {
            match event {
                ServerEvent::IceCandidate { from, candidate } => {
                    assert_eq!(from, "u2");
                    assert_eq!(candidate["n"], i);
                }
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_end_call_forwarded() {
        let registry = Arc::new(PresenceRegistry::new());
        let relay = SignalingRelay::new(registry.clone());
        let (handle, mut rx) = fake_connection();
        registry.register("u2", handle).await;

        relay
            .forward(
                "u1",
                ClientCommand::EndCall {
                    target_id: "u2".to_string(),
                },
            )
            .await;

        assert!(matches!(
            drain(&mut rx).pop().unwrap(),
            ServerEvent::CallEnded { from } if from == "u1"
        ));
    }
}
