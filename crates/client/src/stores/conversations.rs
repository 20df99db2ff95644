//! Per-conversation message store with unseen counters.
//!
//! This is the single source of truth for messages on the client. It
//! reconciles two producers: REST-confirmed sends (the collaborator's echo)
//! and events pushed over the socket. Both arrive in heterogeneous shapes,
//! so everything is normalized into [`ChatMessage`] on the way in.

use std::collections::HashMap;

use chrono::Utc;
use patter_shared::{ChatKind, ChatMessage, RawMessage};
use tokio::sync::mpsc;

const UNKNOWN_SENDER: &str = "unknown_sender";
const UNKNOWN_GROUP: &str = "unknown_group";

/// Messages for a single conversation.
#[derive(Debug, Default, Clone)]
pub struct Conversation {
    /// Append-only; insertion order is arrival order as observed by this
    /// client, not necessarily server timestamp order.
    pub messages: Vec<ChatMessage>,
    /// Whether history has been fetched from the collaborator.
    pub is_loaded: bool,
}

/// Conversation-id keyed store plus unseen counters.
pub struct ConversationStore {
    local_user: String,
    conversations: HashMap<String, Conversation>,
    unseen: HashMap<String, u32>,
    open: Option<String>,
    mark_seen_tx: mpsc::UnboundedSender<String>,
}

/// Resolve the sender through the documented fallback chain. Direct and
/// group producers shape payloads differently, so every rung is load-bearing.
fn resolve_sender(raw: &RawMessage) -> String {
    if let Some(id) = &raw.sender_id {
        return id.clone();
    }
    if let Some(sender) = &raw.sender {
        if let Some(id) = sender.object_id.as_ref().or(sender.id.as_ref()) {
            return id.clone();
        }
    }
    if let Some(id) = &raw.user_id {
        return id.clone();
    }
    UNKNOWN_SENDER.to_string()
}

/// Normalize an inbound shape into a [`ChatMessage`].
///
/// Missing id and createdAt default to the local clock; lossy, but it keeps
/// partial events renderable instead of fatal.
pub fn normalize(raw: &RawMessage, kind: ChatKind) -> ChatMessage {
    let now = Utc::now();
    ChatMessage {
        id: raw
            .id
            .clone()
            .unwrap_or_else(|| now.timestamp_millis().to_string()),
        sender_id: resolve_sender(raw),
        text: raw.text.clone(),
        image: raw.image.clone(),
        created_at: raw.created_at.unwrap_or(now),
        group_id: match kind {
            ChatKind::Group => Some(
                raw.group_id
                    .clone()
                    .or_else(|| raw.receiver_id.clone())
                    .unwrap_or_else(|| UNKNOWN_GROUP.to_string()),
            ),
            ChatKind::Direct => None,
        },
    }
}

impl ConversationStore {
    /// Returns the store plus the receiver side of the mark-seen channel.
    /// The runtime drains it into the collaborator, ignoring failures.
    pub fn new(local_user: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (mark_seen_tx, mark_seen_rx) = mpsc::unbounded_channel();
        (
            Self {
                local_user: local_user.into(),
                conversations: HashMap::new(),
                unseen: HashMap::new(),
                open: None,
                mark_seen_tx,
            },
            mark_seen_rx,
        )
    }

    /// Ordered messages for a conversation; empty if never touched.
    pub fn conversation(&self, id: &str) -> &[ChatMessage] {
        self.conversations
            .get(id)
            .map(|c| c.messages.as_slice())
            .unwrap_or_default()
    }

    pub fn is_loaded(&self, id: &str) -> bool {
        self.conversations.get(id).is_some_and(|c| c.is_loaded)
    }

    pub fn unseen(&self, id: &str) -> u32 {
        self.unseen.get(id).copied().unwrap_or(0)
    }

    /// Mark a conversation as the open one, resetting its unseen counter.
    pub fn open_conversation(&mut self, id: Option<&str>) {
        self.open = id.map(str::to_string);
        if let Some(id) = id {
            self.unseen.remove(id);
        }
    }

    /// Seed unseen counters from the roster fetch.
    pub fn seed_unseen(&mut self, counts: HashMap<String, u32>) {
        for (id, count) in counts {
            if count > 0 {
                self.unseen.insert(id, count);
            }
        }
    }

    /// Replace a conversation's messages from a history fetch.
    pub fn set_history(&mut self, id: &str, history: &[RawMessage], kind: ChatKind) {
        let conversation = self.conversations.entry(id.to_string()).or_default();
        conversation.messages = history.iter().map(|raw| normalize(raw, kind)).collect();
        conversation.is_loaded = true;
    }

    /// Record a pushed event.
    ///
    /// Appends under the group id (group) or the sender identity (direct). A
    /// message for a conversation that is not open bumps its unseen counter;
    /// one for the open direct conversation queues a best-effort mark-seen.
    pub fn record_incoming(&mut self, raw: &RawMessage, kind: ChatKind) {
        let message = normalize(raw, kind);
        let key = match kind {
            ChatKind::Group => message
                .group_id
                .clone()
                .unwrap_or_else(|| UNKNOWN_GROUP.to_string()),
            ChatKind::Direct => message.sender_id.clone(),
        };

        let is_open = self.open.as_deref() == Some(key.as_str());
        if is_open {
            if kind == ChatKind::Direct {
                // Fire-and-forget; the drain task swallows failures.
                let _ = self.mark_seen_tx.send(message.id.clone());
            }
        } else {
            *self.unseen.entry(key.clone()).or_insert(0) += 1;
        }

        self.conversations
            .entry(key)
            .or_default()
            .messages
            .push(message);
    }

    /// Record the collaborator's echo of a message this client sent.
    ///
    /// Keyed by the explicit send target, and the sender field is overwritten
    /// with the local identity so self-authorship is never misattributed,
    /// whatever the echo contains.
    pub fn record_sent(&mut self, raw: &RawMessage, kind: ChatKind, target_id: &str) {
        let mut message = normalize(raw, kind);
        message.sender_id = self.local_user.clone();
        self.conversations
            .entry(target_id.to_string())
            .or_default()
            .messages
            .push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patter_shared::RawSender;

    fn raw(text: &str) -> RawMessage {
        RawMessage {
            id: Some(format!("m-{}", text)),
            sender_id: Some("u2".to_string()),
            text: Some(text.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_sender_fallback_chain() {
        let flat = RawMessage {
            sender_id: Some("a".to_string()),
            sender: Some(RawSender {
                object_id: Some("b".to_string()),
                id: None,
            }),
            user_id: Some("c".to_string()),
            ..Default::default()
        };
        assert_eq!(resolve_sender(&flat), "a");

        let nested = RawMessage {
            sender: Some(RawSender {
                object_id: Some("b".to_string()),
                id: Some("b2".to_string()),
            }),
            user_id: Some("c".to_string()),
            ..Default::default()
        };
        assert_eq!(resolve_sender(&nested), "b");

        let nested_plain = RawMessage {
            sender: Some(RawSender {
                object_id: None,
                id: Some("b2".to_string()),
            }),
            ..Default::default()
        };
        assert_eq!(resolve_sender(&nested_plain), "b2");

        let generic = RawMessage {
            user_id: Some("c".to_string()),
            ..Default::default()
        };
        assert_eq!(resolve_sender(&generic), "c");

        assert_eq!(resolve_sender(&RawMessage::default()), "unknown_sender");
    }

    #[test]
    fn test_normalize_defaults_id_and_timestamp() {
        let before = Utc::now();
        let message = normalize(&RawMessage::default(), ChatKind::Direct);
        assert!(!message.id.is_empty());
        assert!(message.created_at >= before);
        assert!(message.group_id.is_none());
    }

    #[test]
    fn test_group_key_fallback() {
        let via_receiver = RawMessage {
            receiver_id: Some("g9".to_string()),
            ..Default::default()
        };
        let message = normalize(&via_receiver, ChatKind::Group);
        assert_eq!(message.group_id.as_deref(), Some("g9"));

        let bare = normalize(&RawMessage::default(), ChatKind::Group);
        assert_eq!(bare.group_id.as_deref(), Some("unknown_group"));
    }

    #[test]
    fn test_incoming_bumps_unseen_for_closed_conversation() {
        let (mut store, mut seen_rx) = ConversationStore::new("me");
        store.record_incoming(&raw("hi"), ChatKind::Direct);
        store.record_incoming(&raw("again"), ChatKind::Direct);

        assert_eq!(store.unseen("u2"), 2);
        assert_eq!(store.conversation("u2").len(), 2);
        assert!(seen_rx.try_recv().is_err());
    }

    #[test]
    fn test_incoming_to_open_direct_queues_mark_seen() {
        let (mut store, mut seen_rx) = ConversationStore::new("me");
        store.open_conversation(Some("u2"));
        store.record_incoming(&raw("hi"), ChatKind::Direct);

        assert_eq!(store.unseen("u2"), 0);
        assert_eq!(seen_rx.try_recv().unwrap(), "m-hi");
    }

    #[test]
    fn test_opening_conversation_resets_unseen() {
        let (mut store, _seen_rx) = ConversationStore::new("me");
        store.record_incoming(&raw("hi"), ChatKind::Direct);
        assert_eq!(store.unseen("u2"), 1);

        store.open_conversation(Some("u2"));
        assert_eq!(store.unseen("u2"), 0);
    }

    #[test]
    fn test_record_sent_overwrites_sender() {
        let (mut store, _seen_rx) = ConversationStore::new("me");
        // Echo claims someone else authored it.
        let echo = RawMessage {
            id: Some("m1".to_string()),
            sender_id: Some("impostor".to_string()),
            text: Some("hello".to_string()),
            ..Default::default()
        };
        store.record_sent(&echo, ChatKind::Direct, "u2");

        let messages = store.conversation("u2");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sender_id, "me");
    }

    #[test]
    fn test_group_incoming_keys_by_group_id() {
        let (mut store, _seen_rx) = ConversationStore::new("me");
        let message = RawMessage {
            group_id: Some("g1".to_string()),
            sender_id: Some("u2".to_string()),
            text: Some("yo".to_string()),
            ..Default::default()
        };
        store.record_incoming(&message, ChatKind::Group);

        assert_eq!(store.conversation("g1").len(), 1);
        assert!(store.conversation("u2").is_empty());
        assert_eq!(store.unseen("g1"), 1);
    }

    #[test]
    fn test_set_history_marks_loaded() {
        let (mut store, _seen_rx) = ConversationStore::new("me");
        assert!(!store.is_loaded("u2"));
        store.set_history("u2", &[raw("old")], ChatKind::Direct);
        assert!(store.is_loaded("u2"));
        assert_eq!(store.conversation("u2").len(), 1);
    }

    #[test]
    fn test_seed_unseen_skips_zero_counts() {
        let (mut store, _seen_rx) = ConversationStore::new("me");
        let mut counts = HashMap::new();
        counts.insert("u2".to_string(), 3);
        counts.insert("u3".to_string(), 0);
        store.seed_unseen(counts);

        assert_eq!(store.unseen("u2"), 3);
        assert_eq!(store.unseen("u3"), 0);
    }
}
