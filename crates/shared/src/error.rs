//! Error types shared between the client core and its callers.

use thiserror::Error;

/// Errors from the persistence collaborator's REST surface.
///
/// Fetch and send failures are surfaced to the user; mark-seen is a
/// best-effort side channel and its failures are swallowed by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The collaborator answered 200 but flagged the operation as failed.
    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),
}
