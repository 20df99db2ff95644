//! Shared data models for the patter chat backplane.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which flavour of conversation a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChatKind {
    Direct,
    Group,
}

/// A normalized chat message as the client stores it.
///
/// Inbound payloads are heterogeneous (the persistence service shapes direct
/// and group messages differently), so this record only exists after
/// normalization; it never appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub sender_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Set for group messages only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

/// Nested sender object some producers attach instead of a flat sender id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSender {
    #[serde(default, rename = "_id")]
    pub object_id: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}

/// Permissive inbound message shape.
///
/// Every field is optional; the client reconciliation store resolves the
/// sender through a documented fallback chain and fills missing id/timestamp
/// from the local clock.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    #[serde(default, rename = "_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub sender_id: Option<String>,
    #[serde(default)]
    pub sender: Option<RawSender>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub receiver_id: Option<String>,
}

/// A user entry from the roster fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterUser {
    #[serde(rename = "_id")]
    pub id: String,
    pub full_name: String,
    #[serde(default)]
    pub profile_pic: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
}

/// A group entry from the roster fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterGroup {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub members: Vec<String>,
    #[serde(default)]
    pub admin: Option<String>,
}

/// An event handed to the server's router by the persistence service after
/// it has stored a message.
///
/// The message body is carried opaquely; the router forwards it without
/// interpreting it, so producers are free to shape it however they already do.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum RoutedEvent {
    Direct {
        to: String,
        message: serde_json::Value,
    },
    Group {
        group_id: String,
        message: serde_json::Value,
    },
}
