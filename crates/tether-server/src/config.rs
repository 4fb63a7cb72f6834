//! Server configuration

use std::net::SocketAddr;

use crate::{Result, ServerError};

/// Default WebSocket endpoint path
pub const DEFAULT_WS_PATH: &str = "/api/ws";

/// Default cap on a single inbound message (1 MiB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Configuration for the WebSocket server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_address: SocketAddr,
    /// Path WebSocket upgrades are accepted on; other paths get 404
    pub ws_path: String,
    /// Maximum size of one inbound message in bytes
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 8080)),
            ws_path: DEFAULT_WS_PATH.to_string(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.ws_path.starts_with('/') {
            return Err(ServerError::Config(format!(
                "WebSocket path must start with '/': {}",
                self.ws_path
            )));
        }
        if self.max_message_size == 0 {
            return Err(ServerError::Config(
                "max message size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
