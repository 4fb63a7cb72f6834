//! The seam between call correlation and whatever carries the frames.

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, timeout_at};

use crate::error::{ClientError, ClientResult};
use crate::events::{ConnectionEvent, LinkId};
use crate::state::ConnectionState;

/// A logical connection a [`CallCorrelator`](crate::CallCorrelator) can drive.
///
/// Implemented by [`ConnectionManager`](crate::ConnectionManager) for a direct
/// connection and by [`RelayPort`](crate::RelayPort) for one endpoint of a
/// shared connection.
pub trait MessageChannel: Send + Sync + 'static {
    /// Start connecting if idle or down. No-op while connecting or open.
    fn connect(&self);

    /// Transmit one text frame, returning the link it went out on.
    /// Fails with [`ClientError::NotConnected`] unless the connection is open.
    fn send_text(&self, text: String) -> ClientResult<LinkId>;

    /// Latest-value view of the connection state
    fn watch_state(&self) -> watch::Receiver<ConnectionState>;

    /// Ordered stream of state changes and inbound messages
    fn subscribe(&self) -> mpsc::UnboundedReceiver<ConnectionEvent>;

    fn state(&self) -> ConnectionState {
        *self.watch_state().borrow()
    }
}

/// Resolve once `state` reports open, or fail at `deadline`.
pub async fn wait_until_open(
    mut state: watch::Receiver<ConnectionState>,
    deadline: Instant,
) -> ClientResult<()> {
    match timeout_at(deadline, state.wait_for(ConnectionState::is_open)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(_)) => Err(ClientError::ConnectionClosed),
        Err(_) => Err(ClientError::Timeout),
    }
}
