//! Client-side state stores.

pub mod conversations;
pub mod presence;

pub use conversations::{normalize, Conversation, ConversationStore};
pub use presence::OnlineUsers;
