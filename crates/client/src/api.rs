//! REST client for the persistence collaborator.
//!
//! History fetches and sends surface their errors to the caller; mark-seen is
//! best-effort and its failures are swallowed by the drain task in
//! [`crate::ChatClient`].

use std::collections::HashMap;

use patter_shared::{ApiError, ChatKind, RawMessage, RosterGroup, RosterUser};
use serde::{Deserialize, Serialize};

/// Payload for a send: text, image, or both.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsersResponse {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    users: Vec<RosterUser>,
    #[serde(default)]
    unseen_messages: HashMap<String, u32>,
}

#[derive(Debug, Deserialize)]
struct GroupsResponse {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    groups: Vec<RosterGroup>,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    messages: Vec<RawMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendResponse {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    new_message: Option<RawMessage>,
}

#[derive(Debug, Deserialize)]
struct AckResponse {
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

/// The full user and group roster, fetched once at startup.
#[derive(Debug, Clone)]
pub struct Roster {
    pub users: Vec<RosterUser>,
    pub groups: Vec<RosterGroup>,
    /// Per-conversation unseen counts the collaborator computed from
    /// messages that arrived while this client was offline.
    pub unseen: HashMap<String, u32>,
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    pub async fn fetch_roster(&self) -> Result<Roster, ApiError> {
        let users: UsersResponse = self.get("/api/messages/users").await?;
        if !users.success {
            return Err(rejected(users.message));
        }
        let groups: GroupsResponse = self.get("/api/groups").await?;
        if !groups.success {
            return Err(rejected(groups.message));
        }
        Ok(Roster {
            users: users.users,
            groups: groups.groups,
            unseen: users.unseen_messages,
        })
    }

    /// Ordered message history for one conversation.
    pub async fn fetch_history(
        &self,
        conversation_id: &str,
        kind: ChatKind,
    ) -> Result<Vec<RawMessage>, ApiError> {
        let path = match kind {
            ChatKind::Direct => format!("/api/messages/{}", conversation_id),
            ChatKind::Group => format!("/api/groups/{}/messages", conversation_id),
        };
        let response: HistoryResponse = self.get(&path).await?;
        if !response.success {
            return Err(rejected(response.message));
        }
        Ok(response.messages)
    }

    /// Send a message; the echo is the stored record the collaborator created.
    pub async fn send_message(
        &self,
        target_id: &str,
        kind: ChatKind,
        payload: &OutgoingMessage,
    ) -> Result<RawMessage, ApiError> {
        let path = match kind {
            ChatKind::Direct => format!("/api/messages/send/{}", target_id),
            ChatKind::Group => format!("/api/groups/{}/message", target_id),
        };
        let response: SendResponse = self.post(&path, payload).await?;
        if !response.success {
            return Err(rejected(response.message));
        }
        response
            .new_message
            .ok_or_else(|| ApiError::Deserialize("send echo missing newMessage".to_string()))
    }

    /// Mark one message seen. Best-effort; callers ignore the result.
    pub async fn mark_seen(&self, message_id: &str) -> Result<(), ApiError> {
        let path = format!("/api/messages/mark/{}", message_id);
        let response: AckResponse = self.put(&path).await?;
        if !response.success {
            return Err(rejected(response.message));
        }
        Ok(())
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let request = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token);
        Self::execute(request).await
    }

    async fn post<T: serde::de::DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let request = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
            .json(body);
        Self::execute(request).await
    }

    async fn put<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let request = self
            .http
            .put(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token);
        Self::execute(request).await
    }

    async fn execute<T: serde::de::DeserializeOwned>(
        request: reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(ApiError::Http {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| ApiError::Deserialize(e.to_string()))
    }
}

fn rejected(message: Option<String>) -> ApiError {
    ApiError::Rejected(message.unwrap_or_else(|| "unknown error".to_string()))
}
