//! Application state shared across request handlers.

use std::sync::Arc;

use crate::presence::PresenceRegistry;
use crate::relay::SignalingRelay;
use crate::rooms::GroupRooms;
use crate::router::EventRouter;

/// Shared application state.
///
/// The registry and room maps are injectable components rather than
/// process-wide statics, so tests and embedders can build isolated instances.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<PresenceRegistry>,
    pub rooms: Arc<GroupRooms>,
    pub router: Arc<EventRouter>,
    pub relay: Arc<SignalingRelay>,
}

impl AppState {
    pub fn new() -> Self {
        let registry = Arc::new(PresenceRegistry::new());
        let rooms = Arc::new(GroupRooms::new());
        let router = Arc::new(EventRouter::new(registry.clone(), rooms.clone()));
        let relay = Arc::new(SignalingRelay::new(registry.clone()));

        Self {
            registry,
            rooms,
            router,
            relay,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
