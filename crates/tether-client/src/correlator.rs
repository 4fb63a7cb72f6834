//! Call correlation: request ids, pending calls, deadlines.
//!
//! Every outgoing call gets a fresh UUID v7 id and a pending record holding
//! the one-shot reply slot. Removing the record from the table is the only
//! way to settle it, so whichever of response, timeout or disconnect gets
//! there first wins and the others find nothing to do.

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tether_json_rpc_server::{JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, RequestId};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::channel::{MessageChannel, wait_until_open};
use crate::error::{ClientError, ClientResult};
use crate::events::{ConnectionEvent, InboundMessage, LinkId};

const NOTIFICATION_CAPACITY: usize = 64;

type Reply = oneshot::Sender<ClientResult<Value>>;

struct PendingCall {
    method: String,
    /// Link the request went out on; `None` while the send is in progress
    link: Option<LinkId>,
    reply: Reply,
}

#[derive(Default)]
struct PendingTable {
    calls: HashMap<RequestId, PendingCall>,
    /// Highest link id known to have gone down
    closed_through: LinkId,
}

/// Pending calls, shared between callers and the event task.
#[derive(Default)]
struct PendingCalls {
    table: Mutex<PendingTable>,
}

impl PendingCalls {
    fn register(&self, method: &str) -> (RequestId, oneshot::Receiver<ClientResult<Value>>) {
        let (reply, rx) = oneshot::channel();
        let mut table = self.table.lock();
        let id = loop {
            let id = RequestId::String(Uuid::now_v7().to_string());
            if !table.calls.contains_key(&id) {
                break id;
            }
        };
        table.calls.insert(
            id.clone(),
            PendingCall {
                method: method.to_string(),
                link: None,
                reply,
            },
        );
        (id, rx)
    }

    /// Record the link a request went out on. If that link already went
    /// down, the call is rejected here.
    fn assign_link(&self, id: &RequestId, link: LinkId) {
        let mut table = self.table.lock();
        if link <= table.closed_through {
            if let Some(call) = table.calls.remove(id) {
                let _ = call.reply.send(Err(ClientError::ConnectionClosed));
            }
        } else if let Some(call) = table.calls.get_mut(id) {
            call.link = Some(link);
        }
    }

    fn take(&self, id: &RequestId) -> Option<PendingCall> {
        self.table.lock().calls.remove(id)
    }

    fn resolve(&self, message: JsonRpcMessage) {
        let Some(id) = message.id().cloned() else {
            warn!(?message, "received response without id");
            return;
        };
        let Some(call) = self.take(&id) else {
            debug!(%id, "dropping response for unknown or settled call");
            return;
        };
        trace!(%id, method = %call.method, "settling call");
        let _ = call
            .reply
            .send(message.into_result().map_err(ClientError::from));
    }

    /// Reject every call sent on `link` or earlier.
    fn reject_link(&self, link: LinkId) {
        let mut table = self.table.lock();
        table.closed_through = table.closed_through.max(link);
        let closed_through = table.closed_through;

        let doomed: Vec<RequestId> = table
            .calls
            .iter()
            .filter(|(_, call)| call.link.is_some_and(|l| l <= closed_through))
            .map(|(id, _)| id.clone())
            .collect();
        if !doomed.is_empty() {
            debug!(count = doomed.len(), link, "rejecting calls on closed connection");
        }
        for id in doomed {
            if let Some(call) = table.calls.remove(&id) {
                let _ = call.reply.send(Err(ClientError::ConnectionClosed));
            }
        }
    }

    fn len(&self) -> usize {
        self.table.lock().calls.len()
    }
}

/// Correlates outgoing calls with incoming responses over any
/// [`MessageChannel`].
pub struct CallCorrelator<C: MessageChannel> {
    channel: Arc<C>,
    pending: Arc<PendingCalls>,
    notifications: broadcast::Sender<JsonRpcNotification>,
    default_timeout: Duration,
    event_task: JoinHandle<()>,
}

impl<C: MessageChannel> CallCorrelator<C> {
    /// Start correlating on `channel`. Must be called inside a Tokio runtime.
    pub fn new(channel: Arc<C>, default_timeout: Duration) -> Self {
        let pending = Arc::new(PendingCalls::default());
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        let event_task = tokio::spawn(run_events(
            channel.subscribe(),
            Arc::clone(&pending),
            notifications.clone(),
        ));
        Self {
            channel,
            pending,
            notifications,
            default_timeout,
            event_task,
        }
    }

    pub fn channel(&self) -> &Arc<C> {
        &self.channel
    }

    /// Call `method` with the default timeout
    pub async fn call(&self, method: &str, params: Option<Value>) -> ClientResult<Value> {
        self.call_with_timeout(method, params, self.default_timeout)
            .await
    }

    /// Call `method` and wait for its result.
    ///
    /// If the connection is not open, a connect is requested and the call
    /// waits for it. `timeout` bounds the wait for the connection and the
    /// wait for the reply together.
    pub async fn call_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> ClientResult<Value> {
        let deadline = Instant::now() + timeout;

        if !self.channel.state().is_open() {
            debug!(method, "connection not open, waiting before sending call");
            self.channel.connect();
            wait_until_open(self.channel.watch_state(), deadline).await?;
        }

        let (id, mut reply) = self.pending.register(method);
        let frame = match serde_json::to_string(&JsonRpcRequest::new(id.clone(), method, params)) {
            Ok(frame) => frame,
            Err(e) => {
                self.pending.take(&id);
                return Err(e.into());
            }
        };

        debug!(%id, method, "sending call");
        match self.channel.send_text(frame) {
            Ok(link) => self.pending.assign_link(&id, link),
            Err(e) => {
                if self.pending.take(&id).is_some() {
                    return Err(e);
                }
            }
        }

        match timeout_at(deadline, &mut reply).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ClientError::ConnectionClosed),
            Err(_) => match self.pending.take(&id) {
                Some(call) => {
                    debug!(%id, method = %call.method, "call timed out");
                    Err(ClientError::Timeout)
                }
                // settled just as the deadline passed
                None => reply.await.unwrap_or(Err(ClientError::ConnectionClosed)),
            },
        }
    }

    /// Call `method` and decode its result into `T`
    pub async fn call_typed<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> ClientResult<T> {
        let value = self.call(method, params).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Send a notification. Fails unless the connection is open.
    pub fn notify(&self, method: &str, params: Option<Value>) -> ClientResult<()> {
        let frame = serde_json::to_string(&JsonRpcNotification::new(method, params))?;
        self.channel.send_text(frame).map(|_| ())
    }

    /// Server-initiated notifications received from now on
    pub fn notifications(&self) -> broadcast::Receiver<JsonRpcNotification> {
        self.notifications.subscribe()
    }

    /// Number of calls waiting for a reply
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl<C: MessageChannel> Drop for CallCorrelator<C> {
    fn drop(&mut self) {
        self.event_task.abort();
    }
}

async fn run_events(
    mut events: mpsc::UnboundedReceiver<ConnectionEvent>,
    pending: Arc<PendingCalls>,
    notifications: broadcast::Sender<JsonRpcNotification>,
) {
    while let Some(event) = events.recv().await {
        match event {
            ConnectionEvent::StateChanged { state, link } if !state.is_open() => {
                pending.reject_link(link);
            }
            ConnectionEvent::StateChanged { .. } => {}
            ConnectionEvent::Message(InboundMessage::Response(message)) => {
                pending.resolve(message);
            }
            ConnectionEvent::Message(InboundMessage::Notification(notification)) => {
                trace!(method = %notification.method, "received notification");
                // no subscribers is fine
                let _ = notifications.send(notification);
            }
        }
    }
}
