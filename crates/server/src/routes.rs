//! HTTP routes: liveness probe and the event-ingress endpoint.

use axum::{extract::State, http::StatusCode, Json};
use patter_shared::RoutedEvent;

use crate::state::AppState;

/// Liveness probe.
pub async fn status() -> &'static str {
    "Server is live"
}

/// Event ingress for the persistence service.
///
/// Called after a message has been stored, so this endpoint only routes.
/// Always answers 202: a routing miss (recipient offline, room empty) is
/// invisible to the producer by design.
pub async fn route_event(
    State(state): State<AppState>,
    Json(event): Json<RoutedEvent>,
) -> StatusCode {
    state.router.route(event).await;
    StatusCode::ACCEPTED
}
