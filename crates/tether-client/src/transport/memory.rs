//! In-process transport.
//!
//! [`MemoryTransport::pair`] returns the client half and a [`MemoryListener`]
//! that receives one [`MemoryPeer`] per accepted `open()`. The listener also
//! controls whether attempts are accepted, refused, or left hanging.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tether_json_rpc_server::JsonRpcRouter;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{Frame, Link, Transport, TransportType};
use crate::error::TransportError;

/// How the next `open()` calls are answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    #[default]
    Accept,
    Refuse,
    /// Never completes; exercises connect timeouts
    Hang,
}

#[derive(Debug, Default)]
struct ListenerState {
    mode: Mutex<OpenMode>,
    attempts: AtomicUsize,
}

/// Client half of an in-process link factory.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    endpoint: String,
    state: Arc<ListenerState>,
    peers: mpsc::UnboundedSender<MemoryPeer>,
}

/// Server half: yields the peer end of every accepted link.
#[derive(Debug)]
pub struct MemoryListener {
    state: Arc<ListenerState>,
    peers: mpsc::UnboundedReceiver<MemoryPeer>,
}

/// Server end of one in-process link.
#[derive(Debug)]
pub struct MemoryPeer {
    incoming: mpsc::UnboundedReceiver<String>,
    outgoing: mpsc::UnboundedSender<Result<Frame, TransportError>>,
}

impl MemoryTransport {
    pub fn pair(endpoint: impl Into<String>) -> (Self, MemoryListener) {
        let state = Arc::new(ListenerState::default());
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        (
            Self {
                endpoint: endpoint.into(),
                state: Arc::clone(&state),
                peers: peers_tx,
            },
            MemoryListener {
                state,
                peers: peers_rx,
            },
        )
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::Memory
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn open(&self) -> Result<Link, TransportError> {
        self.state.attempts.fetch_add(1, Ordering::SeqCst);
        let mode = *self.state.mode.lock();
        match mode {
            OpenMode::Refuse => {
                return Err(TransportError::ConnectionFailed(format!(
                    "{} refused the connection",
                    self.endpoint
                )));
            }
            OpenMode::Hang => futures::future::pending::<()>().await,
            OpenMode::Accept => {}
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let peer = MemoryPeer {
            incoming: outbound_rx,
            outgoing: inbound_tx,
        };
        self.peers
            .send(peer)
            .map_err(|_| TransportError::ConnectionFailed("listener dropped".to_string()))?;

        Ok(Link {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

impl MemoryListener {
    /// Wait for the next accepted link
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.peers.recv().await
    }

    pub fn set_mode(&self, mode: OpenMode) {
        *self.state.mode.lock() = mode;
    }

    /// Number of `open()` calls seen so far, whatever their outcome
    pub fn attempts(&self) -> usize {
        self.state.attempts.load(Ordering::SeqCst)
    }
}

impl MemoryPeer {
    /// Next frame sent by the client; `None` once the client dropped the link
    pub async fn recv(&mut self) -> Option<String> {
        self.incoming.recv().await
    }

    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.outgoing.send(Ok(Frame::Text(text.into()))).is_ok()
    }

    pub fn send_binary(&self, bytes: impl Into<Vec<u8>>) -> bool {
        self.outgoing.send(Ok(Frame::Binary(bytes.into()))).is_ok()
    }

    /// End the link with a transport failure
    pub fn fail(self, reason: impl Into<String>) {
        let _ = self
            .outgoing
            .send(Err(TransportError::WebSocket(reason.into())));
    }

    /// End the link cleanly
    pub fn close(self) {}

    /// Answer every incoming frame with `router` until either side closes.
    pub fn serve(mut self, router: JsonRpcRouter) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(text) = self.recv().await {
                let Some(reply) = router.route(&text).await else {
                    continue;
                };
                if !self.send_text(reply) {
                    break;
                }
            }
        })
    }
}
