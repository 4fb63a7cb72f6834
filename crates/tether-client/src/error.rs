//! Error types for client operations

use serde_json::Value;
use tether_json_rpc_server::JsonRpcErrorObject;
use thiserror::Error;

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Error type for client operations
#[derive(Error, Debug)]
pub enum ClientError {
    /// Transport-level errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// JSON encoding or decoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The deadline passed before the connection opened or a reply arrived
    #[error("Operation timed out")]
    Timeout,

    /// A frame could not be sent because the connection is not open
    #[error("Not connected")]
    NotConnected,

    /// The connection closed while the call was pending
    #[error("Connection closed")]
    ConnectionClosed,

    /// Server returned an error
    #[error("Server error (code {code}): {message}")]
    ServerError {
        code: i64,
        message: String,
        data: Option<Value>,
    },
}

/// Transport-specific errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("WebSocket transport error: {0}")]
    WebSocket(String),

    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported transport: {0}")]
    Unsupported(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Transport closed unexpectedly")]
    Closed,
}

impl ClientError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a server error from a JSON-RPC error response
    pub fn server_error(code: i64, message: impl Into<String>, data: Option<Value>) -> Self {
        Self::ServerError {
            code,
            message: message.into(),
            data,
        }
    }

    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(TransportError::ConnectionFailed(_)) => true,
            Self::Transport(TransportError::Closed) => true,
            Self::Timeout | Self::NotConnected | Self::ConnectionClosed => true,
            Self::ServerError { code, .. } => matches!(code, -32099..=-32000),
            _ => false,
        }
    }

    /// Get the error code if this is a server error
    pub fn error_code(&self) -> Option<i64> {
        match self {
            Self::ServerError { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<JsonRpcErrorObject> for ClientError {
    fn from(error: JsonRpcErrorObject) -> Self {
        Self::ServerError {
            code: error.code,
            message: error.message,
            data: error.data,
        }
    }
}
