//! Headless client core for the patter chat backplane.
//!
//! Owns the per-conversation message store, the online set, the call session
//! state machine and the managed server connection. Rendering and navigation
//! live in the UI shell, which calls into this crate.
//!
//! [`ChatClient::new`] spawns background tasks and must be called inside a
//! tokio runtime.

pub mod api;
pub mod call;
pub mod client;
pub mod stores;
pub mod ws;

pub use api::{ApiClient, OutgoingMessage, Roster};
pub use call::{CallController, CallError, CallRole, CallState, LocalMedia, MediaBackend, PeerConnection};
pub use client::ChatClient;
pub use stores::{ConversationStore, OnlineUsers};
pub use ws::{ws_url, ConnectionState, ReconnectConfig, WsConnection};
