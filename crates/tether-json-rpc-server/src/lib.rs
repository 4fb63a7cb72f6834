//! # JSON-RPC 2.0 Router
//!
//! A transport-agnostic JSON-RPC 2.0 server core. It owns the wire types, the
//! standard error table, an explicitly constructed method registry and a router
//! that turns one raw text frame into zero or one response frame.
//!
//! ## Features
//! - Single requests, notifications and batches
//! - Typed parameter binding through each method's decode step
//! - Concurrent batch dispatch with input-ordered output
//! - Handler failures (errors and panics) converted to `-32603`
//!
//! ```rust,no_run
//! use tether_json_rpc_server::{JsonRpcRouter, MethodRegistry};
//! use serde_json::{json, Value};
//!
//! # async fn demo() {
//! let registry = MethodRegistry::builder()
//!     .function("ping", |_params: Value| async move { Ok::<_, String>(json!("pong")) })
//!     .build();
//! let router = JsonRpcRouter::new(registry);
//!
//! let reply = router.route(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).await;
//! assert!(reply.is_some());
//! # }
//! ```

pub mod error;
pub mod notification;
pub mod prelude;
pub mod registry;
pub mod request;
pub mod response;
pub mod router;
pub mod types;

// Re-export main types
pub use error::{JsonRpcError, JsonRpcErrorCode, JsonRpcErrorObject, JsonRpcTransportError};
pub use notification::JsonRpcNotification;
pub use registry::{HandlerFailure, MethodDescriptor, MethodHandler, MethodRegistry, MethodRegistryBuilder};
pub use request::JsonRpcRequest;
pub use response::{JsonRpcMessage, JsonRpcResponse};
pub use router::{JsonRpcRouter, RouteOutput};
pub use types::{JsonRpcVersion, RequestId};

/// JSON-RPC 2.0 version constant
pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC 2.0 error codes
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}
