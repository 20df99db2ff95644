//! Group room membership, tracked per connection.
//!
//! Membership is not persisted and does not mirror stored group membership:
//! a connection is in a room only between an explicit join and the matching
//! leave (or its disconnect). A user who is online but has not opened the
//! conversation is therefore not in the room and misses the live push; the
//! next history fetch surfaces the message instead.

use std::collections::HashMap;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::presence::ConnectionHandle;

/// Concurrency-safe room id -> joined connections map.
#[derive(Default)]
pub struct GroupRooms {
    inner: RwLock<HashMap<String, HashMap<Uuid, ConnectionHandle>>>,
}

impl GroupRooms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join a room. Joining twice is a no-op.
    pub async fn join(&self, group_id: &str, handle: ConnectionHandle) {
        let mut inner = self.inner.write().await;
        let room = inner.entry(group_id.to_string()).or_default();
        if room.insert(handle.conn_id, handle).is_none() {
            tracing::debug!(group_id, "connection joined room");
        }
    }

    /// Leave a room. Leaving a room the connection never joined is a no-op.
    pub async fn leave(&self, group_id: &str, conn_id: Uuid) {
        let mut inner = self.inner.write().await;
        if let Some(room) = inner.get_mut(group_id) {
            if room.remove(&conn_id).is_some() {
                tracing::debug!(group_id, "connection left room");
            }
            if room.is_empty() {
                inner.remove(group_id);
            }
        }
    }

    /// Drop all memberships for a closing connection.
    pub async fn leave_all(&self, conn_id: Uuid) {
        let mut inner = self.inner.write().await;
        inner.retain(|_, room| {
            room.remove(&conn_id);
            !room.is_empty()
        });
    }

    /// Snapshot of the connections currently joined to `group_id`.
    pub async fn members(&self, group_id: &str) -> Vec<ConnectionHandle> {
        self.inner
            .read()
            .await
            .get(group_id)
            .map(|room| room.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patter_shared::{ServerEvent, WsEnvelope};
    use tokio::sync::mpsc;

    fn fake_connection() -> (
        ConnectionHandle,
        mpsc::UnboundedReceiver<WsEnvelope<ServerEvent>>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionHandle::new(Uuid::new_v4(), tx), rx)
    }

    #[tokio::test]
    async fn test_join_is_idempotent() {
        let rooms = GroupRooms::new();
        let (handle, _rx) = fake_connection();

        rooms.join("g1", handle.clone()).await;
        rooms.join("g1", handle).await;
        assert_eq!(rooms.members("g1").await.len(), 1);
    }

    #[tokio::test]
    async fn test_leave_when_not_joined_is_noop() {
        let rooms = GroupRooms::new();
        rooms.leave("g1", Uuid::new_v4()).await;
        assert!(rooms.members("g1").await.is_empty());
    }

    #[tokio::test]
    async fn test_leave_all_clears_every_room() {
        let rooms = GroupRooms::new();
        let (handle, _rx) = fake_connection();
        let conn_id = handle.conn_id;
        let (other, _other_rx) = fake_connection();

        rooms.join("g1", handle.clone()).await;
        rooms.join("g2", handle).await;
        rooms.join("g2", other).await;

        rooms.leave_all(conn_id).await;
        assert!(rooms.members("g1").await.is_empty());
        assert_eq!(rooms.members("g2").await.len(), 1);
    }
}
