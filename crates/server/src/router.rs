//! Event router: forwards stored chat events to live recipients.

use std::sync::Arc;

use patter_shared::{RoutedEvent, ServerEvent};

use crate::presence::PresenceRegistry;
use crate::rooms::GroupRooms;

/// Routes chat events arriving from the persistence service.
///
/// Delivery is best-effort: there is no offline queue, no acknowledgment and
/// no retry. A dropped event is indistinguishable from one never sent; the
/// recipient catches up through a history fetch.
pub struct EventRouter {
    registry: Arc<PresenceRegistry>,
    rooms: Arc<GroupRooms>,
}

impl EventRouter {
    pub fn new(registry: Arc<PresenceRegistry>, rooms: Arc<GroupRooms>) -> Self {
        Self { registry, rooms }
    }

    pub async fn route(&self, event: RoutedEvent) {
        match event {
            RoutedEvent::Direct { to, message } => {
                match self.registry.lookup(&to).await {
                    Some(handle) => handle.send(ServerEvent::NewMessage { message }),
                    None => tracing::debug!(%to, "direct event dropped, target offline"),
                }
            }
            RoutedEvent::Group { group_id, message } => {
                // Fans out to joined connections only, regardless of who is
                // online; see GroupRooms for the join/leave contract.
                let members = self.rooms.members(&group_id).await;
                if members.is_empty() {
                    tracing::debug!(%group_id, "group event dropped, room empty");
                    return;
                }
                for handle in members {
                    handle.send(ServerEvent::NewGroupMessage {
                        message: message.clone(),
                    });
                }
            }
        }
    }
}
