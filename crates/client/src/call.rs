//! Call session state machine.
//!
//! Sequences media acquisition, offer/answer exchange and ICE candidate
//! exchange for a one-to-one call. The server only relays signaling and holds
//! no call state, so this machine must tolerate stray events: double answers,
//! candidates for a session that no longer exists, termination at any point.
//!
//! Media and the peer connection sit behind traits so the machine can be
//! driven in tests without a real device or RTC stack.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use patter_shared::ClientCommand;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// A session is already active; new calls are rejected, never overwritten.
    #[error("a call is already in progress")]
    Busy,

    #[error("no call in a state that allows this operation")]
    InvalidState,

    /// Camera/microphone unavailable. Fatal to the attempt only.
    #[error("media acquisition failed: {0}")]
    Media(String),

    #[error("signaling failed: {0}")]
    Signaling(String),
}

/// A held local media stream (camera + microphone).
pub trait LocalMedia: Send {
    /// Stop all tracks and release the device.
    fn stop(&mut self);
}

/// An RTC peer connection.
#[async_trait]
pub trait PeerConnection: Send {
    async fn create_offer(&mut self) -> Result<Value, CallError>;
    async fn create_answer(&mut self) -> Result<Value, CallError>;
    async fn set_remote_description(&mut self, description: Value) -> Result<(), CallError>;
    async fn add_ice_candidate(&mut self, candidate: Value) -> Result<(), CallError>;
    fn has_remote_description(&self) -> bool;
    /// Close the connection and detach any video sinks.
    fn close(&mut self);
}

/// Factory for media streams and peer connections.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    async fn acquire_media(&self) -> Result<Box<dyn LocalMedia>, CallError>;
    async fn create_peer_connection(
        &self,
        media: &mut dyn LocalMedia,
    ) -> Result<Box<dyn PeerConnection>, CallError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallRole {
    Outgoing,
    Incoming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    OutgoingPending,
    IncomingPending,
    Connected,
}

struct CallSession {
    role: CallRole,
    peer: String,
    state: CallState,
    media: Option<Box<dyn LocalMedia>>,
    connection: Option<Box<dyn PeerConnection>>,
    /// The remote offer held while an incoming call awaits user accept.
    pending_offer: Option<Value>,
    /// Candidates that arrived before the remote description was applied.
    queued_candidates: VecDeque<Value>,
}

/// Owns the client-wide call singleton and all transitions on it.
pub struct CallController {
    backend: Arc<dyn MediaBackend>,
    outbox: mpsc::UnboundedSender<ClientCommand>,
    session: Option<CallSession>,
}

impl CallController {
    pub fn new(
        backend: Arc<dyn MediaBackend>,
        outbox: mpsc::UnboundedSender<ClientCommand>,
    ) -> Self {
        Self {
            backend,
            outbox,
            session: None,
        }
    }

    pub fn state(&self) -> CallState {
        self.session
            .as_ref()
            .map(|s| s.state)
            .unwrap_or(CallState::Idle)
    }

    pub fn peer(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.peer.as_str())
    }

    pub fn role(&self) -> Option<CallRole> {
        self.session.as_ref().map(|s| s.role)
    }

    /// Start an outgoing call. On any failure nothing is left held: media is
    /// stopped and the peer connection closed before the error surfaces.
    pub async fn start_call(&mut self, target_id: &str) -> Result<(), CallError> {
        if self.session.is_some() {
            return Err(CallError::Busy);
        }

        let mut media = self.backend.acquire_media().await?;

        let mut connection = match self.backend.create_peer_connection(media.as_mut()).await {
            Ok(connection) => connection,
            Err(e) => {
                media.stop();
                return Err(e);
            }
        };

        let offer = match connection.create_offer().await {
            Ok(offer) => offer,
            Err(e) => {
                connection.close();
                media.stop();
                return Err(e);
            }
        };

        self.send(ClientCommand::CallUser {
            target_id: target_id.to_string(),
            offer,
        });
        tracing::info!(target_id, "outgoing call started");

        self.session = Some(CallSession {
            role: CallRole::Outgoing,
            peer: target_id.to_string(),
            state: CallState::OutgoingPending,
            media: Some(media),
            connection: Some(connection),
            pending_offer: None,
            queued_candidates: VecDeque::new(),
        });
        Ok(())
    }

    /// An `incoming-call` event arrived. While a session is active the caller
    /// is sent `end-call` (busy) instead of replacing the current session.
    pub fn handle_incoming_call(&mut self, from: &str, offer: Value) {
        if self.session.is_some() {
            tracing::info!(from, "rejecting incoming call, session active");
            self.send(ClientCommand::EndCall {
                target_id: from.to_string(),
            });
            return;
        }

        self.session = Some(CallSession {
            role: CallRole::Incoming,
            peer: from.to_string(),
            state: CallState::IncomingPending,
            media: None,
            connection: None,
            pending_offer: Some(offer),
            queued_candidates: VecDeque::new(),
        });
    }

    /// User accepted the pending incoming call.
    pub async fn accept(&mut self) -> Result<(), CallError> {
        let session = self.session.as_mut().ok_or(CallError::InvalidState)?;
        if session.state != CallState::IncomingPending {
            return Err(CallError::InvalidState);
        }
        let offer = session.pending_offer.take().ok_or(CallError::InvalidState)?;

        let backend = self.backend.clone();
        let result = async {
            let mut media = backend.acquire_media().await?;
            let mut connection = match backend.create_peer_connection(media.as_mut()).await {
                Ok(connection) => connection,
                Err(e) => {
                    media.stop();
                    return Err(e);
                }
            };

            let answer = async {
                connection.set_remote_description(offer).await?;
                connection.create_answer().await
            }
            .await;

            match answer {
                Ok(answer) => Ok((media, connection, answer)),
                Err(e) => {
                    connection.close();
                    media.stop();
                    Err(e)
                }
            }
        }
        .await;

        match result {
            Ok((media, connection, answer)) => {
                let peer = {
                    let session = self.session.as_mut().ok_or(CallError::InvalidState)?;
                    session.media = Some(media);
                    session.connection = Some(connection);
                    session.state = CallState::Connected;
                    session.peer.clone()
                };
                self.send(ClientCommand::AnswerCall {
                    target_id: peer,
                    answer,
                });
                self.drain_candidates().await;
                Ok(())
            }
            Err(e) => {
                // Nothing was attached to the session; just drop it.
                self.teardown();
                Err(e)
            }
        }
    }

    /// User declined the pending incoming call.
    pub fn decline(&mut self) -> Result<(), CallError> {
        match &self.session {
            Some(session) if session.state == CallState::IncomingPending => {
                let peer = session.peer.clone();
                self.send(ClientCommand::EndCall { target_id: peer });
                self.teardown();
                Ok(())
            }
            _ => Err(CallError::InvalidState),
        }
    }

    /// The callee answered our outgoing call.
    pub async fn handle_call_accepted(&mut self, from: &str, answer: Value) -> Result<(), CallError> {
        let expecting = matches!(
            &self.session,
            Some(session) if session.state == CallState::OutgoingPending && session.peer == from
        );
        if !expecting {
            // Double answer or answer for a dead session; tolerated.
            tracing::debug!(from, "ignoring stray call-accepted");
            return Ok(());
        }

        let applied = {
            let session = self.session.as_mut().ok_or(CallError::InvalidState)?;
            let connection = session.connection.as_mut().ok_or(CallError::InvalidState)?;
            connection.set_remote_description(answer).await
        };
        match applied {
            Ok(()) => {
                if let Some(session) = self.session.as_mut() {
                    session.state = CallState::Connected;
                }
                self.drain_candidates().await;
                Ok(())
            }
            Err(e) => {
                self.hang_up();
                Err(e)
            }
        }
    }

    /// A remote ICE candidate arrived. Queued FIFO until the remote
    /// description is applied, then applied directly.
    pub async fn handle_remote_candidate(&mut self, candidate: Value) {
        let Some(session) = self.session.as_mut() else {
            tracing::debug!("dropping ICE candidate, no active session");
            return;
        };

        match session.connection.as_mut() {
            Some(connection) if connection.has_remote_description() => {
                if let Err(e) = connection.add_ice_candidate(candidate).await {
                    tracing::warn!("failed to apply ICE candidate: {}", e);
                }
            }
            _ => session.queued_candidates.push_back(candidate),
        }
    }

    /// Forward one of our own candidates to the peer.
    pub fn send_local_candidate(&self, candidate: Value) {
        if let Some(session) = &self.session {
            self.send(ClientCommand::IceCandidate {
                target_id: session.peer.clone(),
                candidate,
            });
        }
    }

    /// The remote side ended the call. Idempotent.
    pub fn handle_call_ended(&mut self) {
        self.teardown();
    }

    /// Local hangup; also the busy-path and decline exit. Idempotent.
    pub fn hang_up(&mut self) {
        if let Some(session) = &self.session {
            self.send(ClientCommand::EndCall {
                target_id: session.peer.clone(),
            });
        }
        self.teardown();
    }

    /// Drain queued candidates in arrival order. A failed application is
    /// logged and skipped, not fatal to the session.
    async fn drain_candidates(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(connection) = session.connection.as_mut() else {
            return;
        };
        while let Some(candidate) = session.queued_candidates.pop_front() {
            if let Err(e) = connection.add_ice_candidate(candidate).await {
                tracing::warn!("failed to apply queued ICE candidate: {}", e);
            }
        }
    }

    /// Release everything on the way back to idle: stop media tracks, close
    /// the peer connection, drop the candidate queue.
    fn teardown(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Some(mut connection) = session.connection.take() {
                connection.close();
            }
            if let Some(mut media) = session.media.take() {
                media.stop();
            }
            tracing::info!(peer = %session.peer, "call session ended");
        }
    }

    fn send(&self, command: ClientCommand) {
        if self.outbox.send(command).is_err() {
            tracing::debug!("dropping signaling command, connection gone");
        }
    }
}
