//! # Client Prelude
//!
//! Convenient re-exports of the most commonly used client types.
//!
//! ```rust
//! use tether_client::prelude::*;
//! ```

// Core client types
pub use crate::client::{RpcClient, RpcClientBuilder};
pub use crate::config::{ClientConfig, ReconnectConfig, TimeoutConfig};
pub use crate::error::{ClientError, ClientResult};
pub use crate::state::ConnectionState;

// Lower-level building blocks
pub use crate::channel::MessageChannel;
pub use crate::connection::ConnectionManager;
pub use crate::correlator::CallCorrelator;
pub use crate::relay::{MultiplexRelay, RelayPort};

// Transport types
pub use crate::transport::{Transport, TransportType, WebSocketTransport};

// Protocol types commonly used with the client
pub use tether_json_rpc_server::{JsonRpcNotification, RequestId};

pub use std::time::Duration;
