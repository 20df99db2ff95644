//! WebSocket protocol: a closed tagged union of event kinds.
//!
//! Event names are preserved on the wire (`call-user`, `incoming-call`, ...)
//! so the catalog reads the same in logs and in client code, but dispatch is
//! an exhaustive `match` rather than string lookup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Envelope wrapping every message in either direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsEnvelope<T> {
    pub id: String,
    #[serde(flatten)]
    pub payload: T,
    pub ts: DateTime<Utc>,
}

impl<T> WsEnvelope<T> {
    pub fn new(payload: T) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            payload,
            ts: Utc::now(),
        }
    }
}

/// Commands a client sends to the server.
///
/// Chat sends are not here: messages travel over the persistence service's
/// REST surface, which hands the stored message to the router afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientCommand {
    JoinGroup {
        group_id: String,
    },
    LeaveGroup {
        group_id: String,
    },
    #[serde(rename = "call-user")]
    CallUser {
        target_id: String,
        offer: serde_json::Value,
    },
    #[serde(rename = "answer-call")]
    AnswerCall {
        target_id: String,
        answer: serde_json::Value,
    },
    #[serde(rename = "ice-candidate")]
    IceCandidate {
        target_id: String,
        candidate: serde_json::Value,
    },
    #[serde(rename = "end-call")]
    EndCall {
        target_id: String,
    },
}

/// Events the server pushes to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// Full snapshot of the online set, re-broadcast on every change.
    GetOnlineUsers {
        users: Vec<String>,
    },
    /// A direct message routed to this connection.
    NewMessage {
        message: serde_json::Value,
    },
    /// A group message fanned out to joined room members.
    NewGroupMessage {
        message: serde_json::Value,
    },
    #[serde(rename = "incoming-call")]
    IncomingCall {
        from: String,
        offer: serde_json::Value,
    },
    #[serde(rename = "call-accepted")]
    CallAccepted {
        from: String,
        answer: serde_json::Value,
    },
    #[serde(rename = "ice-candidate")]
    IceCandidate {
        from: String,
        candidate: serde_json::Value,
    },
    #[serde(rename = "call-ended")]
    CallEnded {
        from: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_command_wire_names() {
        let cmd = ClientCommand::CallUser {
            target_id: "u2".to_string(),
            offer: serde_json::json!({"sdp": "v=0"}),
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["type"], "call-user");
        assert_eq!(json["data"]["targetId"], "u2");

        let cmd = ClientCommand::JoinGroup {
            group_id: "g1".to_string(),
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["type"], "joinGroup");
        assert_eq!(json["data"]["groupId"], "g1");
    }

    #[test]
    fn test_server_event_field_wire_names() {
        let event = ServerEvent::IceCandidate {
            from: "u1".to_string(),
            candidate: serde_json::json!({"n": 0}),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ice-candidate");
        assert_eq!(json["data"]["from"], "u1");

        // Multiword fields are camelCased inside the payload as well.
        let parsed: ClientCommand = serde_json::from_value(serde_json::json!({
            "type": "end-call",
            "data": {"targetId": "u2"},
        }))
        .unwrap();
        assert_eq!(
            parsed,
            ClientCommand::EndCall {
                target_id: "u2".to_string()
            }
        );
    }

    #[test]
    fn test_server_event_round_trips_through_envelope() {
        let envelope = WsEnvelope::new(ServerEvent::IncomingCall {
            from: "u1".to_string(),
            offer: serde_json::json!({"sdp": "v=0"}),
        });
        let text = serde_json::to_string(&envelope).unwrap();
        let parsed: WsEnvelope<ServerEvent> = serde_json::from_str(&text).unwrap();
        match parsed.payload {
            ServerEvent::IncomingCall { from, .. } => assert_eq!(from, "u1"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_online_users_snapshot_shape() {
        let event = ServerEvent::GetOnlineUsers {
            users: vec!["u1".to_string(), "u2".to_string()],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "getOnlineUsers");
        assert_eq!(json["data"]["users"][1], "u2");
    }
}
