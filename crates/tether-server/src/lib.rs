//! # Tether Server
//!
//! Serves a [`JsonRpcRouter`](tether_json_rpc_server::JsonRpcRouter) over
//! WebSocket. Every accepted connection upgrades at the configured path
//! (`/api/ws` by default); each inbound frame is routed on its own task and
//! its reply, if any, is written back on the same connection.
//!
//! ```rust,no_run
//! use tether_server::TetherServer;
//!
//! #[tokio::main]
//! async fn main() -> tether_server::Result<()> {
//!     let server = TetherServer::builder()
//!         .bind_address(([127, 0, 0, 1], 8080).into())
//!         .with_demo_methods()
//!         .build();
//!     server.run().await
//! }
//! ```

pub mod config;
pub mod connection;
pub mod handlers;
pub mod prelude;
pub mod server;

// Re-export main types
pub use config::ServerConfig;
pub use handlers::{EchoHandler, MessageParams, ReverseHandler};
pub use server::{ServerStats, TetherServer, TetherServerBuilder};

// Re-export foundational types
pub use tether_json_rpc_server::{JsonRpcRouter, MethodHandler, MethodRegistry};

/// Result type for server operations
pub type Result<T> = std::result::Result<T, ServerError>;

/// Server errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}
