//! Routes raw JSON-RPC 2.0 frames (single objects or batches) to the registry.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::join_all;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::JSONRPC_VERSION;
use crate::error::{JsonRpcError, JsonRpcErrorObject, JsonRpcTransportError};
use crate::registry::MethodRegistry;
use crate::response::JsonRpcMessage;
use crate::types::RequestId;

/// Fallback frame used if a reply cannot be encoded.
const ENCODE_FAILURE_FRAME: &str =
    r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"Internal error"}}"#;

/// What a routed frame produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RouteOutput {
    /// One response object (also used for whole-frame errors)
    Single(JsonRpcMessage),
    /// Responses for a batch, in input order
    Batch(Vec<JsonRpcMessage>),
}

impl RouteOutput {
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            error!(error = %e, "Failed to serialize JSON-RPC reply");
            ENCODE_FAILURE_FRAME.to_string()
        })
    }

    /// Responses contained in this output, in order.
    pub fn messages(&self) -> &[JsonRpcMessage] {
        match self {
            RouteOutput::Single(message) => std::slice::from_ref(message),
            RouteOutput::Batch(messages) => messages,
        }
    }
}

/// JSON-RPC 2.0 router over a read-only [`MethodRegistry`].
#[derive(Debug, Clone)]
pub struct JsonRpcRouter {
    registry: Arc<MethodRegistry>,
}

impl JsonRpcRouter {
    pub fn new(registry: MethodRegistry) -> Self {
        Self::with_shared_registry(Arc::new(registry))
    }

    pub fn with_shared_registry(registry: Arc<MethodRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }

    /// Route one text frame. `None` means nothing is sent back.
    pub async fn route(&self, raw: &str) -> Option<String> {
        match parse_frame(raw) {
            Ok(message) => self
                .route_value(message)
                .await
                .map(|output| output.to_json_string()),
            Err(e) => Some(undecodable(e)),
        }
    }

    /// Route a binary frame: decoded as UTF-8 text first.
    pub async fn route_binary(&self, raw: Vec<u8>) -> Option<String> {
        match frame_text(raw) {
            Ok(text) => self.route(&text).await,
            Err(e) => Some(undecodable(e)),
        }
    }

    /// Route an already parsed frame.
    pub async fn route_value(&self, message: Value) -> Option<RouteOutput> {
        match message {
            Value::Object(obj) => self.route_single(obj).await.map(RouteOutput::Single),
            Value::Array(items) => self.route_batch(items).await,
            other => {
                debug!(kind = json_kind(&other), "JSON-RPC frame is neither object nor array");
                Some(RouteOutput::Single(JsonRpcError::parse_error().into()))
            }
        }
    }

    async fn route_batch(&self, items: Vec<Value>) -> Option<RouteOutput> {
        if items.is_empty() {
            debug!("empty JSON-RPC batch");
            return Some(RouteOutput::Single(JsonRpcError::invalid_request(None).into()));
        }

        debug!(size = items.len(), "dispatching JSON-RPC batch");
        // join_all polls every element concurrently and yields results by position
        let replies = join_all(items.into_iter().map(|item| async move {
            match item {
                Value::Object(obj) => self.route_single(obj).await,
                _ => Some(JsonRpcError::invalid_request(None).into()),
            }
        }))
        .await;

        let replies: Vec<JsonRpcMessage> = replies.into_iter().flatten().collect();
        if replies.is_empty() {
            None
        } else {
            Some(RouteOutput::Batch(replies))
        }
    }

    async fn route_single(&self, mut obj: Map<String, Value>) -> Option<JsonRpcMessage> {
        let is_notification = !obj.contains_key("id");
        let id = obj.get("id").and_then(RequestId::from_value);
        let reply = |message: JsonRpcMessage| (!is_notification).then_some(message);

        if obj.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            debug!(id = ?id, "rejecting request with bad jsonrpc version");
            return reply(JsonRpcError::invalid_request(id).into());
        }

        let method = match obj.get("method").and_then(Value::as_str) {
            Some(method) if !method.trim().is_empty() => method.to_string(),
            _ => {
                return reply(JsonRpcMessage::error(
                    id,
                    JsonRpcErrorObject::invalid_request(Some(
                        "Invalid Request: missing method".to_string(),
                    )),
                ));
            }
        };

        if obj.get("id").is_some_and(|raw| !raw.is_null()) && id.is_none() {
            return reply(JsonRpcMessage::error(
                None,
                JsonRpcErrorObject::invalid_request(Some(
                    "Invalid Request: id must be a string or a number".to_string(),
                )),
            ));
        }

        let Some(descriptor) = self.registry.get(&method) else {
            debug!(method = %method, "method not found");
            return reply(JsonRpcError::method_not_found(id, &method).into());
        };

        let params = match obj.remove("params") {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(params @ Value::Object(_)) => params,
            Some(Value::Array(_)) => {
                return reply(JsonRpcMessage::error(
                    id,
                    JsonRpcErrorObject::invalid_params(
                        Some("Invalid params: positional params not supported".to_string()),
                        None,
                    ),
                ));
            }
            Some(_) => {
                return reply(JsonRpcMessage::error(
                    id,
                    JsonRpcErrorObject::invalid_params(None, None),
                ));
            }
        };

        let invocation = match std::panic::catch_unwind(AssertUnwindSafe(|| descriptor.bind(params))) {
            Ok(Ok(invocation)) => invocation,
            Ok(Err(e)) => {
                debug!(method = %method, error = %e, "params did not bind");
                return reply(JsonRpcMessage::error(
                    id,
                    JsonRpcErrorObject::invalid_params(None, Some(Value::String(e.to_string()))),
                ));
            }
            Err(panic) => {
                let description = panic_description(panic.as_ref());
                warn!(method = %method, panic = %description, "handler panicked while binding");
                return reply(JsonRpcError::internal_error(id, Some(Value::String(description))).into());
            }
        };

        debug!(method = %method, id = ?id, notification = is_notification, "dispatching");
        let outcome = AssertUnwindSafe(invocation).catch_unwind().await;
        let message = match outcome {
            Ok(Ok(result)) => JsonRpcMessage::success(id, result),
            Ok(Err(failure)) => {
                warn!(method = %method, error = %failure, "handler failed");
                JsonRpcError::internal_error(id, Some(Value::String(failure.to_string()))).into()
            }
            Err(panic) => {
                let description = panic_description(panic.as_ref());
                warn!(method = %method, panic = %description, "handler panicked");
                JsonRpcError::internal_error(id, Some(Value::String(description))).into()
            }
        };
        reply(message)
    }
}

fn parse_frame(raw: &str) -> Result<Value, JsonRpcTransportError> {
    Ok(serde_json::from_str(raw)?)
}

fn frame_text(raw: Vec<u8>) -> Result<String, JsonRpcTransportError> {
    Ok(String::from_utf8(raw)?)
}

/// Parse error reply for a frame that never became JSON
fn undecodable(e: JsonRpcTransportError) -> String {
    debug!(error = %e, "rejecting undecodable JSON-RPC frame");
    RouteOutput::Single(JsonRpcError::parse_error().into()).to_json_string()
}

fn panic_description(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("handler panicked: {}", s)
    } else {
        "handler panicked".to_string()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
