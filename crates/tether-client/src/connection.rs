//! Connection manager: one logical connection with automatic reconnection.
//!
//! All lifecycle bookkeeping sits behind a single lock. A generation counter
//! is bumped by every attempt and by `close()`; tasks spawned for an older
//! generation (connect attempts, link readers, reconnect timers) find a
//! different number when they wake up and back out without touching state.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::channel::{MessageChannel, wait_until_open};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult, TransportError};
use crate::events::{ConnectionEvent, EventFanout, LinkId, decode_frame};
use crate::state::ConnectionState;
use crate::transport::{BoxedTransport, Frame, Link, TransportType};

/// Owns the link to the server and its lifecycle.
///
/// Dropping the manager closes the connection.
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

struct Shared {
    transport: BoxedTransport,
    config: ClientConfig,
    state_tx: watch::Sender<ConnectionState>,
    events: EventFanout,
    inner: Mutex<Inner>,
}

struct Inner {
    state: ConnectionState,
    generation: u64,
    link_id: LinkId,
    auto_reconnect: bool,
    backoff: Backoff,
    outbound: Option<mpsc::UnboundedSender<String>>,
    attempt_task: Option<JoinHandle<()>>,
    reader_task: Option<JoinHandle<()>>,
    retry_task: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    /// Create a manager. An invalid reconnect schedule is logged and its
    /// delays raised to [`MIN_DELAY`](crate::backoff::MIN_DELAY).
    pub fn new(transport: BoxedTransport, config: ClientConfig) -> Self {
        if let Err(e) = config.validate() {
            warn!(endpoint = %transport.endpoint(), error = %e, "client configuration is invalid");
        }
        let backoff = Backoff::new(config.reconnect.initial_delay, config.reconnect.max_delay)
            .with_jitter(config.reconnect.jitter);
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        let inner = Inner {
            state: ConnectionState::Idle,
            generation: 0,
            link_id: 0,
            auto_reconnect: config.reconnect.auto_reconnect,
            backoff,
            outbound: None,
            attempt_task: None,
            reader_task: None,
            retry_task: None,
        };
        Self {
            shared: Arc::new(Shared {
                transport,
                config,
                state_tx,
                events: EventFanout::default(),
                inner: Mutex::new(inner),
            }),
        }
    }

    pub fn endpoint(&self) -> &str {
        self.shared.transport.endpoint()
    }

    pub fn transport_type(&self) -> TransportType {
        self.shared.transport.transport_type()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Begin connecting. Idempotent while connecting or open.
    ///
    /// Re-enables automatic reconnection if a previous `close()` disabled it
    /// and cancels any pending retry timer in favour of an immediate attempt.
    pub fn connect(&self) {
        let mut inner = self.shared.inner.lock();
        inner.auto_reconnect = self.shared.config.reconnect.auto_reconnect;
        if matches!(
            inner.state,
            ConnectionState::Connecting | ConnectionState::Open
        ) {
            return;
        }
        if let Some(retry) = inner.retry_task.take() {
            retry.abort();
        }
        self.shared.begin_attempt(&mut inner);
    }

    /// Close the connection and stop reconnecting.
    ///
    /// An open connection reports `closed` then `idle`; anything else goes
    /// straight to `idle`. Calls waiting on the connection are rejected by
    /// their correlator when it sees the state change.
    pub fn close(&self) {
        self.shared.close();
    }

    /// Connect and wait until open, bounded by the configured connect timeout
    pub async fn open(&self) -> ClientResult<()> {
        self.connect();
        let deadline = Instant::now() + self.shared.config.timeouts.connect;
        wait_until_open(self.watch_state(), deadline).await
    }

    /// Wait until the connection is open, without initiating anything
    pub async fn wait_for_open(&self, timeout: Duration) -> ClientResult<()> {
        wait_until_open(self.watch_state(), Instant::now() + timeout).await
    }

    /// Transmit one text frame on the current link
    pub fn send(&self, text: String) -> ClientResult<LinkId> {
        let inner = self.shared.inner.lock();
        match (&inner.state, &inner.outbound) {
            (ConnectionState::Open, Some(outbound)) => outbound
                .send(text)
                .map(|_| inner.link_id)
                .map_err(|_| ClientError::NotConnected),
            _ => Err(ClientError::NotConnected),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.inner.lock().state
    }

    /// Stream of states, starting with the current one
    pub fn state_stream(&self) -> WatchStream<ConnectionState> {
        WatchStream::new(self.shared.state_tx.subscribe())
    }

    /// Ordered events: every state change and every inbound message
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ConnectionEvent> {
        self.shared.events.subscribe()
    }

    /// Whether a reconnect timer is currently armed
    pub fn retry_scheduled(&self) -> bool {
        self.shared.inner.lock().retry_task.is_some()
    }

    /// Delay the next retry would use (before jitter)
    pub fn next_retry_delay(&self) -> Duration {
        self.shared.inner.lock().backoff.current()
    }
}

impl MessageChannel for ConnectionManager {
    fn connect(&self) {
        ConnectionManager::connect(self)
    }

    fn send_text(&self, text: String) -> ClientResult<LinkId> {
        self.send(text)
    }

    fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<ConnectionEvent> {
        ConnectionManager::subscribe(self)
    }

    fn state(&self) -> ConnectionState {
        ConnectionManager::state(self)
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shared.close();
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.endpoint())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Shared {
    /// Publish `next` if it is a legal successor of the current state.
    fn transition(&self, inner: &mut Inner, next: ConnectionState) -> bool {
        let current = inner.state;
        if !current.can_transition_to(next) {
            warn!(from = %current, to = %next, "ignoring illegal state transition");
            return false;
        }
        inner.state = next;
        self.state_tx.send_replace(next);
        debug!(endpoint = %self.transport.endpoint(), from = %current, to = %next, "connection state changed");
        self.events.publish(ConnectionEvent::StateChanged {
            state: next,
            link: inner.link_id,
        });
        true
    }

    fn begin_attempt(self: &Arc<Self>, inner: &mut Inner) {
        inner.generation += 1;
        let generation = inner.generation;
        self.transition(inner, ConnectionState::Connecting);

        let shared = Arc::clone(self);
        inner.attempt_task = Some(tokio::spawn(async move {
            shared.run_attempt(generation).await;
        }));
    }

    async fn run_attempt(self: Arc<Self>, generation: u64) {
        let connect_timeout = self.config.timeouts.connect;
        let outcome = match tokio::time::timeout(connect_timeout, self.transport.open()).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::ConnectionFailed(format!(
                "no connection within {:?}",
                connect_timeout
            ))),
        };

        let mut inner = self.inner.lock();
        if inner.generation != generation {
            debug!("connection attempt superseded, discarding result");
            return;
        }
        inner.attempt_task = None;

        match outcome {
            Ok(Link { outbound, inbound }) => {
                inner.link_id += 1;
                inner.outbound = Some(outbound);
                inner.backoff.reset();
                info!(endpoint = %self.transport.endpoint(), link = inner.link_id, "connection open");
                self.transition(&mut inner, ConnectionState::Open);

                let shared = Arc::clone(&self);
                inner.reader_task = Some(tokio::spawn(shared.read_link(generation, inbound)));
            }
            Err(e) => {
                warn!(endpoint = %self.transport.endpoint(), error = %e, "connection attempt failed");
                self.transition(&mut inner, ConnectionState::Error);
                self.schedule_retry(&mut inner);
            }
        }
    }

    async fn read_link(
        self: Arc<Self>,
        generation: u64,
        mut inbound: mpsc::UnboundedReceiver<Result<Frame, TransportError>>,
    ) {
        let mut failure = None;
        while let Some(frame) = inbound.recv().await {
            let text = match frame.map(Frame::into_text) {
                Ok(Ok(text)) => text,
                Ok(Err(e)) => {
                    warn!(error = %e, "dropping binary frame that is not UTF-8");
                    continue;
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            };
            for message in decode_frame(&text) {
                self.events.publish(ConnectionEvent::Message(message));
            }
        }
        self.link_lost(generation, failure);
    }

    fn link_lost(self: &Arc<Self>, generation: u64, failure: Option<TransportError>) {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return;
        }
        inner.outbound = None;
        inner.reader_task = None;

        let next = match failure {
            Some(e) => {
                warn!(endpoint = %self.transport.endpoint(), error = %e, "connection failed");
                ConnectionState::Error
            }
            None => {
                info!(endpoint = %self.transport.endpoint(), "connection closed by peer");
                ConnectionState::Closed
            }
        };
        self.transition(&mut inner, next);
        self.schedule_retry(&mut inner);
    }

    fn schedule_retry(self: &Arc<Self>, inner: &mut Inner) {
        if !inner.auto_reconnect {
            debug!("automatic reconnection disabled, staying {}", inner.state);
            return;
        }
        let delay = inner.backoff.next_delay();
        let generation = inner.generation;
        debug!(?delay, "scheduling reconnect");

        let shared = Arc::clone(self);
        inner.retry_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut inner = shared.inner.lock();
            if inner.generation != generation {
                return;
            }
            inner.retry_task = None;
            shared.begin_attempt(&mut inner);
        }));
    }

    fn close(&self) {
        let mut inner = self.inner.lock();
        inner.auto_reconnect = false;
        inner.generation += 1;
        for task in [
            inner.retry_task.take(),
            inner.attempt_task.take(),
            inner.reader_task.take(),
        ]
        .into_iter()
        .flatten()
        {
            task.abort();
        }
        // dropping the sender ends the link
        inner.outbound = None;

        match inner.state {
            ConnectionState::Idle => {}
            ConnectionState::Open => {
                info!(endpoint = %self.transport.endpoint(), "closing connection");
                self.transition(&mut inner, ConnectionState::Closed);
                self.transition(&mut inner, ConnectionState::Idle);
            }
            _ => {
                self.transition(&mut inner, ConnectionState::Idle);
            }
        }
    }
}
