//! Connection events and inbound frame classification.

use parking_lot::Mutex;
use serde_json::Value;
use tether_json_rpc_server::{JsonRpcMessage, JsonRpcNotification};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::state::ConnectionState;

/// Sequence number of an opened link; increases with every `open`.
pub type LinkId = u64;

/// A decoded server-to-client message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Reply to one of our calls
    Response(JsonRpcMessage),
    /// Server-initiated notification
    Notification(JsonRpcNotification),
}

/// Everything a subscriber of a connection observes, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// The connection entered `state`. `link` is the most recent link opened
    /// at that point, so a `Closed` or `Error` event names the link that went
    /// away.
    StateChanged { state: ConnectionState, link: LinkId },
    Message(InboundMessage),
}

/// Decode one inbound text frame.
///
/// Batches yield one message per element. Frames that are not valid JSON and
/// elements that are neither a response nor a notification are dropped with a
/// log line.
pub fn decode_frame(text: &str) -> Vec<InboundMessage> {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "dropping undecodable frame");
            return Vec::new();
        }
    };

    match value {
        Value::Array(items) => items.into_iter().filter_map(classify).collect(),
        value => classify(value).into_iter().collect(),
    }
}

fn classify(value: Value) -> Option<InboundMessage> {
    let is_notification = value
        .as_object()
        .map(|obj| !obj.contains_key("id") && obj.get("method").is_some_and(Value::is_string))
        .unwrap_or(false);

    let message = if is_notification {
        serde_json::from_value(value.clone())
            .ok()
            .map(InboundMessage::Notification)
    } else {
        JsonRpcMessage::from_value(value.clone()).map(InboundMessage::Response)
    };

    if message.is_none() {
        debug!(frame = %value, "ignoring message that is neither a response nor a notification");
    }
    message
}

/// Ordered delivery of events to any number of subscribers.
///
/// Each subscriber owns an unbounded queue, so one slow reader never reorders
/// or drops events for the others. Subscribers that went away are pruned on
/// the next publish.
#[derive(Debug, Default)]
pub(crate) struct EventFanout {
    listeners: Mutex<Vec<mpsc::UnboundedSender<ConnectionEvent>>>,
}

impl EventFanout {
    pub(crate) fn subscribe(&self) -> mpsc::UnboundedReceiver<ConnectionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.lock().push(tx);
        rx
    }

    pub(crate) fn publish(&self, event: ConnectionEvent) {
        self.listeners
            .lock()
            .retain(|listener| listener.send(event.clone()).is_ok());
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.listeners.lock().len()
    }
}
