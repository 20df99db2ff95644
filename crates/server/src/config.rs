//! Server configuration from environment variables.

use std::net::SocketAddr;

/// Runtime configuration.
///
/// Environment variables:
/// - `PATTER_BIND`: socket address to listen on (default: "0.0.0.0:5000")
/// - `PATTER_LOG`: tracing filter (default: "patter_server=debug,tower_http=debug")
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub log_filter: String,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let bind = std::env::var("PATTER_BIND")
            .unwrap_or_else(|_| "0.0.0.0:5000".to_string())
            .parse()?;
        let log_filter = std::env::var("PATTER_LOG")
            .unwrap_or_else(|_| "patter_server=debug,tower_http=debug".to_string());

        Ok(Self { bind, log_filter })
    }
}
