//! # Tether Client
//!
//! JSON-RPC 2.0 client over a single reconnecting WebSocket connection.
//!
//! ## Features
//!
//! - **Connection management**: explicit lifecycle states with automatic
//!   reconnection and capped exponential backoff
//! - **Call correlation**: unique request ids, per-call deadlines, rejection of
//!   in-flight calls when the connection drops
//! - **Multiplexing**: one connection shared by several independent callers,
//!   each with its own correlator
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use serde_json::json;
//! use tether_client::RpcClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = RpcClient::builder()
//!         .with_url("ws://127.0.0.1:8080/api/ws")?
//!         .build()?;
//!
//!     client.connect().await?;
//!
//!     let echoed = client.call("echo", Some(json!({"message": "hi"}))).await?;
//!     println!("echo returned {}", echoed);
//!
//!     client.close();
//!     Ok(())
//! }
//! ```
//!
//! ## Sharing a connection
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tether_client::{CallCorrelator, RpcClient};
//!
//! # async fn demo(client: RpcClient) -> Result<(), Box<dyn std::error::Error>> {
//! let relay = client.relay();
//! let tab = CallCorrelator::new(Arc::new(relay.attach()), Duration::from_secs(30));
//! let reversed = tab.call("reverse", Some(serde_json::json!({"message": "abc"}))).await?;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod channel;
pub mod client;
pub mod config;
pub mod connection;
pub mod correlator;
pub mod error;
pub mod events;
pub mod prelude;
pub mod relay;
pub mod state;
pub mod transport;

// Re-export main types
pub use channel::MessageChannel;
pub use client::{ConnectionStatus, RpcClient, RpcClientBuilder};
pub use config::{ClientConfig, ReconnectConfig, TimeoutConfig};
pub use connection::ConnectionManager;
pub use correlator::CallCorrelator;
pub use error::{ClientError, ClientResult, TransportError};
pub use events::{ConnectionEvent, InboundMessage, LinkId};
pub use relay::{EndpointId, MultiplexRelay, RelayPort, RelayStats};
pub use state::ConnectionState;

// Re-export transport types
pub use transport::{Transport, TransportType};
