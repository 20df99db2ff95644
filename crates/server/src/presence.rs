//! Presence registry: user identity to live connection mapping.
//!
//! The registry is the foundation every routed event queries. It is keyed by
//! user id with last-connect-wins semantics: a fresh connection for an
//! already-registered identity simply replaces the mapping, and the stale
//! connection's teardown is prevented from evicting its replacement by
//! matching on the connection id.

use std::collections::HashMap;

use patter_shared::{ServerEvent, WsEnvelope};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// One live connection's outbound side.
///
/// Delivery is fire-and-forget: `send` never blocks and a closed channel
/// (peer mid-disconnect) just drops the event.
#[derive(Clone)]
pub struct ConnectionHandle {
    pub conn_id: Uuid,
    tx: mpsc::UnboundedSender<WsEnvelope<ServerEvent>>,
}

impl ConnectionHandle {
    pub fn new(conn_id: Uuid, tx: mpsc::UnboundedSender<WsEnvelope<ServerEvent>>) -> Self {
        Self { conn_id, tx }
    }

    pub fn send(&self, event: ServerEvent) {
        if self.tx.send(WsEnvelope::new(event)).is_err() {
            tracing::debug!(conn_id = %self.conn_id, "dropping event for closed connection");
        }
    }
}

/// Concurrency-safe user -> connection map.
#[derive(Default)]
pub struct PresenceRegistry {
    inner: RwLock<HashMap<String, ConnectionHandle>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store or overwrite the mapping for `user_id`, then broadcast the
    /// updated online snapshot to every registered connection.
    pub async fn register(&self, user_id: &str, handle: ConnectionHandle) {
        {
            let mut inner = self.inner.write().await;
            inner.insert(user_id.to_string(), handle);
        }
        tracing::info!(user_id, "user connected");
        self.broadcast_online().await;
    }

    /// Remove the mapping for `user_id`, but only if it still points at
    /// `conn_id`. A reconnect replaces the handle before the old socket
    /// finishes closing, and that newer mapping must survive.
    pub async fn unregister(&self, user_id: &str, conn_id: Uuid) {
        let removed = {
            let mut inner = self.inner.write().await;
            match inner.get(user_id) {
                Some(current) if current.conn_id == conn_id => {
                    inner.remove(user_id);
                    true
                }
                _ => false,
            }
        };
        if removed {
            tracing::info!(user_id, "user disconnected");
            self.broadcast_online().await;
        }
    }

    pub async fn lookup(&self, user_id: &str) -> Option<ConnectionHandle> {
        self.inner.read().await.get(user_id).cloned()
    }

    /// The set of identities currently observably online.
    pub async fn online_ids(&self) -> Vec<String> {
        self.inner.read().await.keys().cloned().collect()
    }

    /// Push the full online snapshot to all registered connections.
    /// O(N) per presence change, fine at human connect/disconnect rates.
    async fn broadcast_online(&self) {
        let (users, handles): (Vec<String>, Vec<ConnectionHandle>) = {
            let inner = self.inner.read().await;
            (
                inner.keys().cloned().collect(),
                inner.values().cloned().collect(),
            )
        };
        for handle in handles {
            handle.send(ServerEvent::GetOnlineUsers {
                users: users.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_connection() -> (
        ConnectionHandle,
        mpsc::UnboundedReceiver<WsEnvelope<ServerEvent>>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionHandle::new(Uuid::new_v4(), tx), rx)
    }

    fn online_snapshot(rx: &mut mpsc::UnboundedReceiver<WsEnvelope<ServerEvent>>) -> Vec<String> {
        let mut last = None;
        while let Ok(envelope) = rx.try_recv() {
            if let ServerEvent::GetOnlineUsers { users } = envelope.payload {
                last = Some(users);
            }
        }
        let mut users = last.expect("no online snapshot received");
        users.sort();
        users
    }

    #[tokio::test]
    async fn test_online_set_tracks_register_unregister() {
        let registry = PresenceRegistry::new();
        let (h1, mut rx1) = fake_connection();
        let (h2, _rx2) = fake_connection();
        let conn2 = h2.conn_id;

        registry.register("u1", h1).await;
        registry.register("u2", h2).await;
        assert_eq!(online_snapshot(&mut rx1), vec!["u1", "u2"]);

        registry.unregister("u2", conn2).await;
        assert_eq!(online_snapshot(&mut rx1), vec!["u1"]);

        let mut ids = registry.online_ids().await;
        ids.sort();
        assert_eq!(ids, vec!["u1"]);
    }

    #[tokio::test]
    async fn test_reconnect_replaces_mapping() {
        let registry = PresenceRegistry::new();
        let (old, mut old_rx) = fake_connection();
        let old_conn = old.conn_id;
        let (new, mut new_rx) = fake_connection();

        registry.register("u1", old).await;
        registry.register("u1", new).await;

        let handle = registry.lookup("u1").await.unwrap();
        handle.send(ServerEvent::CallEnded {
            from: "u2".to_string(),
        });

        // Only the new connection sees the event.
        let mut delivered = false;
        while let Ok(envelope) = new_rx.try_recv() {
            delivered |= matches!(envelope.payload, ServerEvent::CallEnded { .. });
        }
        assert!(delivered);
        while let Ok(envelope) = old_rx.try_recv() {
            assert!(!matches!(envelope.payload, ServerEvent::CallEnded { .. }));
        }

        // The stale connection's teardown must not evict the replacement.
        registry.unregister("u1", old_conn).await;
        assert!(registry.lookup("u1").await.is_some());
    }

    #[tokio::test]
    async fn test_unregister_unknown_is_noop() {
        let registry = PresenceRegistry::new();
        registry.unregister("ghost", Uuid::new_v4()).await;
        assert!(registry.online_ids().await.is_empty());
    }
}
