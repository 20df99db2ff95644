//! Client core façade: wires the stores, the call controller and the
//! collaborator API together and consumes pushed events.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use patter_shared::{ApiError, ChatKind, ChatMessage, ClientCommand, ServerEvent};
use tokio::sync::mpsc;

use crate::api::{ApiClient, OutgoingMessage, Roster};
use crate::call::{CallController, CallError, CallState, MediaBackend};
use crate::stores::{ConversationStore, OnlineUsers};

/// One logged-in user's client core.
///
/// Cheap to clone; hand a clone to the connection's event callback and keep
/// one for the UI layer.
#[derive(Clone)]
pub struct ChatClient {
    api: Arc<ApiClient>,
    conversations: Arc<Mutex<ConversationStore>>,
    online: Arc<Mutex<OnlineUsers>>,
    /// Groups this client has joined; replayed after a reconnect because
    /// room membership on the server is per-connection.
    joined_groups: Arc<Mutex<HashSet<String>>>,
    calls: Arc<tokio::sync::Mutex<CallController>>,
    outbox: mpsc::UnboundedSender<ClientCommand>,
}

impl ChatClient {
    /// Build the client core. The returned receiver is the outbound command
    /// stream; feed it to the WebSocket connection's sender side.
    pub fn new(
        user_id: impl Into<String>,
        api: ApiClient,
        backend: Arc<dyn MediaBackend>,
    ) -> (Self, mpsc::UnboundedReceiver<ClientCommand>) {
        let (outbox, outbox_rx) = mpsc::unbounded_channel();
        let (conversations, mark_seen_rx) = ConversationStore::new(user_id);
        let api = Arc::new(api);

        let client = Self {
            api: api.clone(),
            conversations: Arc::new(Mutex::new(conversations)),
            online: Arc::new(Mutex::new(OnlineUsers::new())),
            joined_groups: Arc::new(Mutex::new(HashSet::new())),
            calls: Arc::new(tokio::sync::Mutex::new(CallController::new(
                backend,
                outbox.clone(),
            ))),
            outbox,
        };

        spawn_mark_seen_drain(api, mark_seen_rx);
        (client, outbox_rx)
    }

    /// Consume one pushed event. Never fails: malformed payloads are
    /// normalized or logged, stray call events are tolerated.
    pub async fn handle_event(&self, event: ServerEvent) {
        match event {
            ServerEvent::GetOnlineUsers { users } => {
                self.lock_online().replace(users);
            }
            ServerEvent::NewMessage { message } => {
                self.record_pushed(message, ChatKind::Direct);
            }
            ServerEvent::NewGroupMessage { message } => {
                self.record_pushed(message, ChatKind::Group);
            }
            ServerEvent::IncomingCall { from, offer } => {
                self.calls.lock().await.handle_incoming_call(&from, offer);
            }
            ServerEvent::CallAccepted { from, answer } => {
                if let Err(e) = self.calls.lock().await.handle_call_accepted(&from, answer).await {
                    tracing::warn!("call setup failed: {}", e);
                }
            }
            ServerEvent::IceCandidate { from: _, candidate } => {
                self.calls.lock().await.handle_remote_candidate(candidate).await;
            }
            ServerEvent::CallEnded { from: _ } => {
                self.calls.lock().await.handle_call_ended();
            }
        }
    }

    fn record_pushed(&self, message: serde_json::Value, kind: ChatKind) {
        match serde_json::from_value(message) {
            Ok(raw) => self.lock_conversations().record_incoming(&raw, kind),
            Err(e) => tracing::warn!("dropping unreadable pushed message: {}", e),
        }
    }

    // --- Messaging ---

    /// Send through the collaborator and reconcile the echo into the store.
    pub async fn send_message(
        &self,
        target_id: &str,
        kind: ChatKind,
        payload: OutgoingMessage,
    ) -> Result<(), ApiError> {
        let echo = self.api.send_message(target_id, kind, &payload).await?;
        self.lock_conversations()
            .record_sent(&echo, kind, target_id);
        Ok(())
    }

    /// Fetch history for a conversation and replace the local copy.
    pub async fn load_history(&self, conversation_id: &str, kind: ChatKind) -> Result<(), ApiError> {
        let history = self.api.fetch_history(conversation_id, kind).await?;
        self.lock_conversations()
            .set_history(conversation_id, &history, kind);
        Ok(())
    }

    /// Fetch the roster and seed unseen counters from it.
    pub async fn refresh_roster(&self) -> Result<Roster, ApiError> {
        let roster = self.api.fetch_roster().await?;
        self.lock_conversations().seed_unseen(roster.unseen.clone());
        Ok(roster)
    }

    pub fn open_conversation(&self, id: Option<&str>) {
        self.lock_conversations().open_conversation(id);
    }

    pub fn conversation(&self, id: &str) -> Vec<ChatMessage> {
        self.lock_conversations().conversation(id).to_vec()
    }

    pub fn unseen(&self, id: &str) -> u32 {
        self.lock_conversations().unseen(id)
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.lock_online().is_online(user_id)
    }

    // --- Rooms ---

    pub fn join_group(&self, group_id: &str) {
        self.lock_groups().insert(group_id.to_string());
        self.send_command(ClientCommand::JoinGroup {
            group_id: group_id.to_string(),
        });
    }

    pub fn leave_group(&self, group_id: &str) {
        self.lock_groups().remove(group_id);
        self.send_command(ClientCommand::LeaveGroup {
            group_id: group_id.to_string(),
        });
    }

    /// Re-send joinGroup for every group this client is in. The server drops
    /// room memberships with the old connection, so the host must call this
    /// on every `Connected` transition observed on the connection's
    /// state watch; without it group pushes silently stop after a reconnect.
    pub fn rejoin_groups(&self) {
        let groups: Vec<String> = self.lock_groups().iter().cloned().collect();
        for group_id in groups {
            self.send_command(ClientCommand::JoinGroup { group_id });
        }
    }

    // --- Calls ---

    pub async fn start_call(&self, target_id: &str) -> Result<(), CallError> {
        self.calls.lock().await.start_call(target_id).await
    }

    pub async fn accept_call(&self) -> Result<(), CallError> {
        self.calls.lock().await.accept().await
    }

    pub async fn decline_call(&self) -> Result<(), CallError> {
        self.calls.lock().await.decline()
    }

    pub async fn hang_up(&self) {
        self.calls.lock().await.hang_up();
    }

    pub async fn call_state(&self) -> CallState {
        self.calls.lock().await.state()
    }

    pub async fn send_local_candidate(&self, candidate: serde_json::Value) {
        self.calls.lock().await.send_local_candidate(candidate);
    }

    fn send_command(&self, command: ClientCommand) {
        if self.outbox.send(command).is_err() {
            tracing::debug!("dropping command, connection gone");
        }
    }

    fn lock_conversations(&self) -> std::sync::MutexGuard<'_, ConversationStore> {
        self.conversations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_online(&self) -> std::sync::MutexGuard<'_, OnlineUsers> {
        self.online
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_groups(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.joined_groups
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Drain mark-seen requests into the collaborator. Best-effort: failures are
/// logged and swallowed, never retried.
fn spawn_mark_seen_drain(api: Arc<ApiClient>, mut rx: mpsc::UnboundedReceiver<String>) {
    tokio::spawn(async move {
        while let Some(message_id) = rx.recv().await {
            if let Err(e) = api.mark_seen(&message_id).await {
                tracing::debug!(%message_id, "mark-seen failed: {}", e);
            }
        }
    });
}
