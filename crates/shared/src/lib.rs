pub mod error;
pub mod models;
pub mod protocol;

pub use error::ApiError;
pub use models::{ChatKind, ChatMessage, RawMessage, RawSender, RosterGroup, RosterUser, RoutedEvent};
pub use protocol::{ClientCommand, ServerEvent, WsEnvelope};
