//! High-level client: a connection manager plus a call correlator.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tether_json_rpc_server::JsonRpcNotification;
use tokio::sync::broadcast;
use tokio_stream::wrappers::WatchStream;
use tracing::info;

use crate::config::ClientConfig;
use crate::connection::ConnectionManager;
use crate::correlator::CallCorrelator;
use crate::error::{ClientError, ClientResult};
use crate::relay::MultiplexRelay;
use crate::state::ConnectionState;
use crate::transport::{BoxedTransport, TransportFactory, TransportType};

/// JSON-RPC client over one reconnecting connection.
pub struct RpcClient {
    correlator: CallCorrelator<ConnectionManager>,
    config: ClientConfig,
}

impl RpcClient {
    /// Create a client. Must be called inside a Tokio runtime.
    pub fn new(transport: BoxedTransport, config: ClientConfig) -> Self {
        let manager = Arc::new(ConnectionManager::new(transport, config.clone()));
        let correlator = CallCorrelator::new(manager, config.timeouts.request);
        Self { correlator, config }
    }

    pub fn builder() -> RpcClientBuilder {
        RpcClientBuilder::new()
    }

    /// Connect and wait until the connection is open
    pub async fn connect(&self) -> ClientResult<()> {
        info!(endpoint = %self.manager().endpoint(), "connecting");
        self.manager().open().await
    }

    /// Close the connection and stop reconnecting
    pub fn close(&self) {
        self.manager().close();
    }

    /// Call `method` with the configured request timeout
    pub async fn call(&self, method: &str, params: Option<Value>) -> ClientResult<Value> {
        self.correlator.call(method, params).await
    }

    pub async fn call_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> ClientResult<Value> {
        self.correlator
            .call_with_timeout(method, params, timeout)
            .await
    }

    /// Call `method` and decode its result into `T`
    pub async fn call_typed<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> ClientResult<T> {
        self.correlator.call_typed(method, params).await
    }

    /// Send a notification on the open connection
    pub fn notify(&self, method: &str, params: Option<Value>) -> ClientResult<()> {
        self.correlator.notify(method, params)
    }

    pub fn notifications(&self) -> broadcast::Receiver<JsonRpcNotification> {
        self.correlator.notifications()
    }

    pub fn state(&self) -> ConnectionState {
        self.manager().state()
    }

    /// Stream of connection states, starting with the current one
    pub fn state_stream(&self) -> WatchStream<ConnectionState> {
        self.manager().state_stream()
    }

    pub fn pending_count(&self) -> usize {
        self.correlator.pending_count()
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        self.correlator.channel()
    }

    /// Share this client's connection with further independent callers
    pub fn relay(&self) -> MultiplexRelay {
        MultiplexRelay::new(Arc::clone(self.manager()))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn status(&self) -> ConnectionStatus {
        let manager = self.manager();
        ConnectionStatus {
            state: manager.state(),
            transport_type: manager.transport_type(),
            endpoint: manager.endpoint().to_string(),
            pending_calls: self.pending_count(),
            retry_scheduled: manager.retry_scheduled(),
        }
    }
}

/// Connection status information
#[derive(Debug, Clone)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub transport_type: TransportType,
    pub endpoint: String,
    pub pending_calls: usize,
    pub retry_scheduled: bool,
}

impl ConnectionStatus {
    /// Check if calls can be sent right away
    pub fn is_ready(&self) -> bool {
        self.state.is_open()
    }

    /// Get status summary
    pub fn summary(&self) -> String {
        let retry = if self.retry_scheduled {
            ", retry scheduled"
        } else {
            ""
        };
        format!(
            "{} transport to {} - {} ({} pending{})",
            self.transport_type, self.endpoint, self.state, self.pending_calls, retry
        )
    }
}

/// Builder for creating clients
pub struct RpcClientBuilder {
    transport: Option<BoxedTransport>,
    config: Option<ClientConfig>,
}

impl RpcClientBuilder {
    /// Create a new client builder
    pub fn new() -> Self {
        Self {
            transport: None,
            config: None,
        }
    }

    /// Set transport
    pub fn with_transport(mut self, transport: BoxedTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set transport from URL
    pub fn with_url(mut self, url: &str) -> ClientResult<Self> {
        self.transport = Some(TransportFactory::from_url(url)?);
        Ok(self)
    }

    /// Set configuration
    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Build the client.
    ///
    /// Without an explicit transport, one is created from the configured
    /// endpoint.
    pub fn build(self) -> ClientResult<RpcClient> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let transport = match (self.transport, config.endpoint.as_deref()) {
            (Some(transport), _) => transport,
            (None, Some(endpoint)) => TransportFactory::from_url(endpoint)?,
            (None, None) => {
                return Err(ClientError::config(
                    "a transport or an endpoint must be set before building the client",
                ));
            }
        };

        Ok(RpcClient::new(transport, config))
    }
}

impl Default for RpcClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
