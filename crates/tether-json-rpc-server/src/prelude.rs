//! # JSON-RPC Router Prelude
//!
//! Convenient re-exports of the most commonly used types.
//!
//! ```rust
//! use tether_json_rpc_server::prelude::*;
//! ```

// Core JSON-RPC types
pub use crate::error::{JsonRpcError, JsonRpcErrorCode, JsonRpcErrorObject};
pub use crate::notification::JsonRpcNotification;
pub use crate::request::JsonRpcRequest;
pub use crate::response::{JsonRpcMessage, JsonRpcResponse};
pub use crate::types::{JsonRpcVersion, RequestId};

// Dispatch
pub use crate::registry::{HandlerFailure, MethodDescriptor, MethodHandler, MethodRegistry};
pub use crate::router::{JsonRpcRouter, RouteOutput};

// Standard error codes
pub use crate::error_codes::*;
