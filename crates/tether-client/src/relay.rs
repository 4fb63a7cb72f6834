//! Sharing one connection between several independent callers.
//!
//! [`MultiplexRelay`] sits on a single [`ConnectionManager`] and hands out
//! [`RelayPort`]s. Each port behaves like a connection of its own: a
//! [`CallCorrelator`](crate::CallCorrelator) runs on a port unchanged. Requests
//! from every port go out on the shared connection; each response is routed
//! back to the port that sent the request, while notifications and state
//! changes reach every port.
//!
//! The route table is owned by a single task. Ports talk to it through a
//! command queue that is always drained before the next connection event, so
//! a request is routed before its response can be dispatched.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tether_json_rpc_server::{JsonRpcMessage, RequestId};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::channel::MessageChannel;
use crate::connection::ConnectionManager;
use crate::error::{ClientError, ClientResult};
use crate::events::{ConnectionEvent, EventFanout, InboundMessage, LinkId};
use crate::state::ConnectionState;

/// Identifies one attached port.
pub type EndpointId = u64;

/// Snapshot of the relay's tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub endpoints: usize,
    pub routes: usize,
}

enum RelayCommand {
    Attach {
        endpoint: EndpointId,
        events: Arc<EventFanout>,
    },
    Detach(EndpointId),
    /// Requests about to be sent by `endpoint`
    Track {
        endpoint: EndpointId,
        ids: Vec<RequestId>,
    },
    /// The tracked requests went out on `link`
    Sent { ids: Vec<RequestId>, link: LinkId },
    /// The tracked requests could not be sent
    Untrack(Vec<RequestId>),
}

struct Route {
    endpoint: EndpointId,
    link: Option<LinkId>,
}

#[derive(Default)]
struct RouteTable {
    endpoints: HashMap<EndpointId, Arc<EventFanout>>,
    routes: HashMap<RequestId, Route>,
    closed_through: LinkId,
}

impl RouteTable {
    fn apply(&mut self, command: RelayCommand) {
        match command {
            RelayCommand::Attach { endpoint, events } => {
                debug!(endpoint, "endpoint attached");
                self.endpoints.insert(endpoint, events);
            }
            RelayCommand::Detach(endpoint) => {
                debug!(endpoint, "endpoint detached");
                self.endpoints.remove(&endpoint);
                self.routes.retain(|_, route| route.endpoint != endpoint);
            }
            RelayCommand::Track { endpoint, ids } => {
                for id in ids {
                    let route = Route {
                        endpoint,
                        link: None,
                    };
                    let previous = self.routes.insert(id.clone(), route);
                    if let Some(previous) = previous.filter(|p| p.endpoint != endpoint) {
                        warn!(%id, previous = previous.endpoint, endpoint, "request id reused across endpoints, routing to the latest sender");
                    }
                }
            }
            RelayCommand::Sent { ids, link } => {
                for id in ids {
                    if link <= self.closed_through {
                        self.routes.remove(&id);
                    } else if let Some(route) = self.routes.get_mut(&id) {
                        route.link = Some(link);
                    }
                }
            }
            RelayCommand::Untrack(ids) => {
                for id in ids {
                    self.routes.remove(&id);
                }
            }
        }
    }

    fn dispatch(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::StateChanged { state, link } => {
                if !state.is_open() {
                    self.closed_through = self.closed_through.max(link);
                    let closed_through = self.closed_through;
                    self.routes
                        .retain(|_, route| !route.link.is_some_and(|l| l <= closed_through));
                }
                self.broadcast(ConnectionEvent::StateChanged { state, link });
            }
            ConnectionEvent::Message(InboundMessage::Response(message)) => self.route(message),
            ConnectionEvent::Message(InboundMessage::Notification(notification)) => {
                self.broadcast(ConnectionEvent::Message(InboundMessage::Notification(
                    notification,
                )));
            }
        }
    }

    fn route(&mut self, message: JsonRpcMessage) {
        let Some(route) = message.id().and_then(|id| self.routes.remove(id)) else {
            debug!(id = ?message.id(), "dropping response with no route");
            return;
        };
        match self.endpoints.get(&route.endpoint) {
            Some(events) => {
                trace!(endpoint = route.endpoint, "routing response");
                events.publish(ConnectionEvent::Message(InboundMessage::Response(message)));
            }
            None => debug!(endpoint = route.endpoint, "dropping response for detached endpoint"),
        }
    }

    fn broadcast(&self, event: ConnectionEvent) {
        for events in self.endpoints.values() {
            events.publish(event.clone());
        }
    }

    fn stats(&self) -> RelayStats {
        RelayStats {
            endpoints: self.endpoints.len(),
            routes: self.routes.len(),
        }
    }
}

async fn run_relay(
    mut commands: mpsc::UnboundedReceiver<RelayCommand>,
    mut events: mpsc::UnboundedReceiver<ConnectionEvent>,
    stats: Arc<Mutex<RelayStats>>,
) {
    let mut table = RouteTable::default();
    loop {
        tokio::select! {
            biased;
            command = commands.recv() => match command {
                Some(command) => table.apply(command),
                None => break,
            },
            event = events.recv() => match event {
                Some(event) => table.dispatch(event),
                None => break,
            },
        }
        *stats.lock() = table.stats();
    }
    debug!("relay stopped");
}

/// Multiplexes one connection across many [`RelayPort`]s.
pub struct MultiplexRelay {
    manager: Arc<ConnectionManager>,
    commands: mpsc::UnboundedSender<RelayCommand>,
    next_endpoint: AtomicU64,
    stats: Arc<Mutex<RelayStats>>,
    task: JoinHandle<()>,
}

impl MultiplexRelay {
    /// Start relaying for `manager`. Must be called inside a Tokio runtime.
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let stats = Arc::new(Mutex::new(RelayStats::default()));
        let task = tokio::spawn(run_relay(
            commands_rx,
            manager.subscribe(),
            Arc::clone(&stats),
        ));
        Self {
            manager,
            commands,
            next_endpoint: AtomicU64::new(1),
            stats,
            task,
        }
    }

    /// Attach a new endpoint
    pub fn attach(&self) -> RelayPort {
        let endpoint = self.next_endpoint.fetch_add(1, Ordering::Relaxed);
        let events = Arc::new(EventFanout::default());
        let _ = self.commands.send(RelayCommand::Attach {
            endpoint,
            events: Arc::clone(&events),
        });
        RelayPort {
            endpoint,
            manager: Arc::clone(&self.manager),
            commands: self.commands.clone(),
            events,
        }
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    pub fn stats(&self) -> RelayStats {
        *self.stats.lock()
    }
}

impl Drop for MultiplexRelay {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// One endpoint of a [`MultiplexRelay`]. Dropping the port detaches it.
pub struct RelayPort {
    endpoint: EndpointId,
    manager: Arc<ConnectionManager>,
    commands: mpsc::UnboundedSender<RelayCommand>,
    events: Arc<EventFanout>,
}

impl RelayPort {
    pub fn endpoint(&self) -> EndpointId {
        self.endpoint
    }

    fn command(&self, command: RelayCommand) -> ClientResult<()> {
        self.commands
            .send(command)
            .map_err(|_| ClientError::ConnectionClosed)
    }
}

impl MessageChannel for RelayPort {
    fn connect(&self) {
        self.manager.connect();
    }

    fn send_text(&self, text: String) -> ClientResult<LinkId> {
        let ids = request_ids(&text);
        if ids.is_empty() {
            return self.manager.send(text);
        }

        self.command(RelayCommand::Track {
            endpoint: self.endpoint,
            ids: ids.clone(),
        })?;
        match self.manager.send(text) {
            Ok(link) => {
                self.command(RelayCommand::Sent { ids, link })?;
                Ok(link)
            }
            Err(e) => {
                let _ = self.command(RelayCommand::Untrack(ids));
                Err(e)
            }
        }
    }

    fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.manager.watch_state()
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<ConnectionEvent> {
        self.events.subscribe()
    }
}

impl Drop for RelayPort {
    fn drop(&mut self) {
        let _ = self.commands.send(RelayCommand::Detach(self.endpoint));
    }
}

impl std::fmt::Debug for RelayPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayPort")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

/// Ids of the requests (not notifications) in an outgoing frame
fn request_ids(text: &str) -> Vec<RequestId> {
    fn request_id(value: &Value) -> Option<RequestId> {
        let obj = value.as_object()?;
        obj.get("method")?;
        RequestId::from_value(obj.get("id")?)
    }

    match serde_json::from_str::<Value>(text) {
        Ok(Value::Array(items)) => items.iter().filter_map(request_id).collect(),
        Ok(value) => request_id(&value).into_iter().collect(),
        Err(_) => Vec::new(),
    }
}
