//! Managed WebSocket connection with auto-reconnect.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use patter_shared::{ClientCommand, ServerEvent, WsEnvelope};
use tokio::sync::{mpsc, watch, Mutex};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

/// Connection state for a WebSocket.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Failed { reason: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// Configuration for auto-reconnect behavior.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of reconnect attempts (0 = infinite).
    pub max_attempts: u32,
    pub initial_delay_ms: u32,
    pub max_delay_ms: u32,
    pub backoff_multiplier: f32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 1.5,
        }
    }
}

impl ReconnectConfig {
    pub fn delay_for_attempt(&self, attempt: u32) -> u32 {
        let delay = self.initial_delay_ms as f32 * self.backoff_multiplier.powi(attempt as i32);
        (delay as u32).min(self.max_delay_ms)
    }
}

/// Build the server's WebSocket URL, with the caller's identity as the
/// handshake parameter the presence registry is populated from.
pub fn ws_url(server_url: &str, user_id: &str) -> Result<Url, url::ParseError> {
    let base = server_url
        .trim_end_matches('/')
        .replacen("http://", "ws://", 1)
        .replacen("https://", "wss://", 1);
    let mut url = Url::parse(&format!("{}/api/ws", base))?;
    url.query_pairs_mut().append_pair("userId", user_id);
    Ok(url)
}

/// A managed WebSocket connection to the backplane server.
///
/// Commands queued through [`WsConnection::sender`] survive a reconnect;
/// inbound events are handed to the `on_event` callback in arrival order.
pub struct WsConnection {
    sender: mpsc::UnboundedSender<ClientCommand>,
    state_rx: watch::Receiver<ConnectionState>,
    task: tokio::task::JoinHandle<()>,
}

impl WsConnection {
    pub fn new(
        url: Url,
        on_event: impl Fn(WsEnvelope<ServerEvent>) + Send + Sync + 'static,
    ) -> Self {
        Self::with_config(url, ReconnectConfig::default(), on_event)
    }

    pub fn with_config(
        url: Url,
        config: ReconnectConfig,
        on_event: impl Fn(WsEnvelope<ServerEvent>) + Send + Sync + 'static,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let task = tokio::spawn(connection_loop(
            url,
            config,
            receiver,
            state_tx,
            Arc::new(on_event),
        ));

        Self {
            sender,
            state_rx,
            task,
        }
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<ClientCommand> {
        self.sender.clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    /// Watch for state changes (e.g. to gate UI on connectivity).
    ///
    /// Room membership on the server is per-connection, so on every
    /// `Connected` transition after the first the host must replay joins
    /// (see `ChatClient::rejoin_groups`) or group pushes stop arriving.
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }
}

impl Drop for WsConnection {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn connection_loop(
    url: Url,
    config: ReconnectConfig,
    receiver: mpsc::UnboundedReceiver<ClientCommand>,
    state_tx: watch::Sender<ConnectionState>,
    on_event: Arc<dyn Fn(WsEnvelope<ServerEvent>) + Send + Sync>,
) {
    // Shared with the per-connection send task so queued commands survive
    // a reconnect.
    let receiver = Arc::new(Mutex::new(receiver));
    let mut attempt = 0u32;

    loop {
        let _ = state_tx.send(if attempt == 0 {
            ConnectionState::Connecting
        } else {
            ConnectionState::Reconnecting { attempt }
        });

        match connect_async(url.as_str()).await {
            Ok((stream, _response)) => {
                let _ = state_tx.send(ConnectionState::Connected);
                attempt = 0;
                tracing::info!(%url, "WebSocket connected");

                let (mut write, mut read) = stream.split();

                let receiver_for_send = receiver.clone();
                let send_task = tokio::spawn(async move {
                    loop {
                        let command = {
                            let mut rx = receiver_for_send.lock().await;
                            rx.recv().await
                        };
                        let Some(command) = command else {
                            // Sender side dropped; nothing left to do.
                            break;
                        };
                        let envelope = WsEnvelope::new(command);
                        match serde_json::to_string(&envelope) {
                            Ok(json) => {
                                if let Err(e) = write.send(Message::Text(json.into())).await {
                                    tracing::warn!("WebSocket send failed: {}", e);
                                    break;
                                }
                            }
                            Err(e) => tracing::error!("failed to serialize command: {}", e),
                        }
                    }
                });

                while let Some(result) = read.next().await {
                    match result {
                        Ok(Message::Text(text)) => {
                            match serde_json::from_str::<WsEnvelope<ServerEvent>>(&text) {
                                Ok(event) => on_event(event),
                                Err(e) => tracing::warn!("ignoring malformed event: {}", e),
                            }
                        }
                        Ok(Message::Close(_)) => break,
                        Ok(_) => {}
                        Err(e) => {
                            tracing::warn!("WebSocket read error: {}", e);
                            break;
                        }
                    }
                }

                send_task.abort();
                let _ = state_tx.send(ConnectionState::Disconnected);
                tracing::info!(%url, "WebSocket closed");
            }
            Err(e) => {
                tracing::warn!(%url, "WebSocket connect failed: {}", e);

                if config.max_attempts > 0 && attempt >= config.max_attempts {
                    let _ = state_tx.send(ConnectionState::Failed {
                        reason: format!("max reconnect attempts ({}) exceeded", config.max_attempts),
                    });
                    return;
                }

                let delay = config.delay_for_attempt(attempt);
                tokio::time::sleep(tokio::time::Duration::from_millis(delay as u64)).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delay_is_capped() {
        let config = ReconnectConfig::default();
        assert_eq!(config.delay_for_attempt(0), 1000);
        assert_eq!(config.delay_for_attempt(1), 1500);
        assert_eq!(config.delay_for_attempt(30), config.max_delay_ms);
    }

    #[test]
    fn test_ws_url_carries_identity() {
        let url = ws_url("http://localhost:5000/", "u1").unwrap();
        assert_eq!(url.scheme(), "ws");
        assert_eq!(url.path(), "/api/ws");
        assert_eq!(url.query(), Some("userId=u1"));
    }

    #[test]
    fn test_ws_url_upgrades_https() {
        let url = ws_url("https://chat.example.com", "u1").unwrap();
        assert_eq!(url.scheme(), "wss");
    }
}
