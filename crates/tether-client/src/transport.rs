//! Transport layer: opening a full-duplex text link to the server.
//!
//! A transport only knows how to open one link. Reconnecting, state tracking
//! and call correlation all live above it, in the connection manager.

use async_trait::async_trait;
use std::string::FromUtf8Error;
use tokio::sync::mpsc;
use url::Url;

use crate::error::{ClientResult, TransportError};

pub mod memory;
pub mod websocket;

pub use memory::{MemoryListener, MemoryPeer, MemoryTransport, OpenMode};
pub use websocket::WebSocketTransport;

/// Transport type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportType {
    /// WebSocket (`ws://` / `wss://`)
    WebSocket,
    /// In-process channel pair
    Memory,
}

impl std::fmt::Display for TransportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportType::WebSocket => write!(f, "WebSocket"),
            TransportType::Memory => write!(f, "Memory"),
        }
    }
}

/// A single inbound data frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    /// Frame payload as text; binary frames are decoded as UTF-8.
    pub fn into_text(self) -> Result<String, FromUtf8Error> {
        match self {
            Frame::Text(text) => Ok(text),
            Frame::Binary(bytes) => String::from_utf8(bytes),
        }
    }
}

/// An open link.
///
/// Dropping `outbound` closes the link from our side. `inbound` yields frames
/// until the peer closes (channel end) or the link fails (an `Err` item).
#[derive(Debug)]
pub struct Link {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<Result<Frame, TransportError>>,
}

/// Transport trait defining the interface for all transport implementations
#[async_trait]
pub trait Transport: Send + Sync {
    /// Get transport type
    fn transport_type(&self) -> TransportType;

    /// Endpoint this transport connects to
    fn endpoint(&self) -> &str;

    /// Open a new link. Each call is an independent connection attempt.
    async fn open(&self) -> Result<Link, TransportError>;
}

/// Type alias for a boxed transport
pub type BoxedTransport = Box<dyn Transport>;

/// Helper function to detect transport type from URL
pub fn detect_transport_type(url_str: &str) -> ClientResult<TransportType> {
    let url =
        Url::parse(url_str).map_err(|e| TransportError::InvalidUrl(format!("{}: {}", url_str, e)))?;

    match url.scheme() {
        "ws" | "wss" => Ok(TransportType::WebSocket),
        "http" | "https" => Err(TransportError::Unsupported(
            "plain HTTP is not supported, use ws:// or wss://".to_string(),
        )
        .into()),
        scheme => Err(TransportError::Unsupported(format!("Unknown scheme: {}", scheme)).into()),
    }
}

/// Transport factory for creating transport instances
pub struct TransportFactory;

impl TransportFactory {
    /// Create a transport from URL string
    pub fn from_url(url: &str) -> ClientResult<BoxedTransport> {
        match detect_transport_type(url)? {
            TransportType::WebSocket => Ok(Box::new(WebSocketTransport::new(url)?)),
            TransportType::Memory => Err(TransportError::Unsupported(
                "memory transports are created with MemoryTransport::pair".to_string(),
            )
            .into()),
        }
    }
}
