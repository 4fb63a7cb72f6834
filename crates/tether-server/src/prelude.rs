//! # Server Prelude
//!
//! ```rust
//! use tether_server::prelude::*;
//! ```

// Core server types
pub use crate::config::ServerConfig;
pub use crate::handlers::{EchoHandler, MessageParams, ReverseHandler};
pub use crate::server::{ServerStats, TetherServer, TetherServerBuilder};

// Re-export foundational types
pub use tether_json_rpc_server::prelude::*;

// Error types
pub use crate::{Result, ServerError};
