//! WebSocket JSON-RPC server
//!
//! Accepts TCP connections, upgrades them at the configured path and hands
//! every inbound frame to a shared [`JsonRpcRouter`].

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tether_json_rpc_server::{
    JsonRpcRouter, MethodDescriptor, MethodHandler, MethodRegistry, MethodRegistryBuilder,
};
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::{Result, ServerError};
use crate::config::ServerConfig;
use crate::connection::serve_connection;
use crate::handlers::register_demo_methods;

/// Builder for the WebSocket server
pub struct TetherServerBuilder {
    config: ServerConfig,
    methods: MethodRegistryBuilder,
}

impl TetherServerBuilder {
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            methods: MethodRegistry::builder(),
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the bind address
    pub fn bind_address(mut self, addr: SocketAddr) -> Self {
        self.config.bind_address = addr;
        self
    }

    /// Set the WebSocket endpoint path
    pub fn ws_path(mut self, path: impl Into<String>) -> Self {
        self.config.ws_path = path.into();
        self
    }

    /// Set maximum inbound message size
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.config.max_message_size = size;
        self
    }

    /// Register a typed method handler
    pub fn handler<H: MethodHandler>(mut self, handler: H) -> Self {
        self.methods = self.methods.handler(handler);
        self
    }

    /// Register a closure under `name`
    pub fn function<P, R, E, F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        E: fmt::Display + Send + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
    {
        self.methods = self.methods.function(name, f);
        self
    }

    /// Register a prepared descriptor
    pub fn descriptor(mut self, descriptor: MethodDescriptor) -> Self {
        self.methods = self.methods.descriptor(descriptor);
        self
    }

    /// Register `echo` and `reverse`
    pub fn with_demo_methods(mut self) -> Self {
        self.methods = register_demo_methods(self.methods);
        self
    }

    /// Build the server
    pub fn build(self) -> TetherServer {
        let registry = self.methods.build();
        debug!(methods = ?registry.registered_methods(), "method registry built");
        TetherServer {
            config: Arc::new(self.config),
            router: JsonRpcRouter::new(registry),
            metrics: Arc::new(ServerMetrics::default()),
        }
    }
}

impl Default for TetherServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Connection counters shared by all connection tasks
#[derive(Debug, Default)]
pub(crate) struct ServerMetrics {
    active: AtomicUsize,
    total: AtomicUsize,
}

impl ServerMetrics {
    /// Count a connection until the returned guard is dropped
    pub(crate) fn connection_opened(self: &Arc<Self>) -> ConnectionGuard {
        self.active.fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed);
        ConnectionGuard(Arc::clone(self))
    }
}

pub(crate) struct ConnectionGuard(Arc<ServerMetrics>);

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Server statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerStats {
    pub active_connections: usize,
    pub total_connections: usize,
}

/// WebSocket JSON-RPC server
#[derive(Clone)]
pub struct TetherServer {
    config: Arc<ServerConfig>,
    router: JsonRpcRouter,
    metrics: Arc<ServerMetrics>,
}

impl TetherServer {
    pub fn builder() -> TetherServerBuilder {
        TetherServerBuilder::new()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn router(&self) -> &JsonRpcRouter {
        &self.router
    }

    /// Bind the configured address and serve until the listener fails
    pub async fn run(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener> {
        self.config.validate()?;
        let listener = TcpListener::bind(self.config.bind_address).await?;
        info!(
            "JSON-RPC WebSocket server listening on {}",
            listener.local_addr()?
        );
        info!("WebSocket endpoint available at: {}", self.config.ws_path);
        Ok(listener)
    }

    /// Serve connections accepted on `listener`
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        loop {
            let (stream, peer) = listener.accept().await?;
            debug!("New connection from {}", peer);

            let router = self.router.clone();
            let config = Arc::clone(&self.config);
            let metrics = Arc::clone(&self.metrics);
            tokio::spawn(async move {
                match serve_connection(stream, peer, router, config, metrics).await {
                    Ok(()) => {}
                    // failed handshakes are routine (port scans, wrong path)
                    Err(ServerError::WebSocket(err)) => {
                        debug!(%peer, "WebSocket handshake failed: {}", err);
                    }
                    Err(err) => error!(%peer, "Error serving connection: {}", err),
                }
            });
        }
    }

    /// Serve until `shutdown` resolves
    pub async fn serve_with_shutdown<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            result = self.serve(listener) => result,
            _ = shutdown => {
                info!("shutdown requested, no longer accepting connections");
                Ok(())
            }
        }
    }

    /// Get server statistics
    pub fn stats(&self) -> ServerStats {
        ServerStats {
            active_connections: self.metrics.active.load(Ordering::Relaxed),
            total_connections: self.metrics.total.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use serde_json::{Value, json};
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message;

    async fn start(server: TetherServer) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { server.serve(listener).await });
        addr
    }

    #[test]
    fn test_builder_registers_methods() {
        let server = TetherServer::builder()
            .with_demo_methods()
            .function("ping", |_: Value| async { Ok::<_, String>("pong") })
            .ws_path("/rpc")
            .build();
        assert_eq!(
            server.router().registry().registered_methods(),
            vec!["echo", "ping", "reverse"]
        );
        assert_eq!(server.config().ws_path, "/rpc");
    }

    #[tokio::test]
    async fn test_text_frame_round_trip() {
        let server = TetherServer::builder().with_demo_methods().build();
        let addr = start(server.clone()).await;

        let (mut ws, _) = connect_async(format!("ws://{}/api/ws", addr)).await.unwrap();
        ws.send(Message::Text(
            r#"{"jsonrpc":"2.0","id":1,"method":"echo","params":{"message":"hi"}}"#.into(),
        ))
        .await
        .unwrap();

        let reply = match ws.next().await.unwrap().unwrap() {
            Message::Text(text) => serde_json::from_str::<Value>(text.as_str()).unwrap(),
            other => panic!("unexpected message: {other:?}"),
        };
        assert_eq!(reply, json!({"jsonrpc":"2.0","id":1,"result":{"echo":"hi"}}));
        assert_eq!(server.stats().active_connections, 1);
    }

    #[tokio::test]
    async fn test_binary_frame_is_routed() {
        let addr = start(TetherServer::builder().with_demo_methods().build()).await;
        let (mut ws, _) = connect_async(format!("ws://{}/api/ws", addr)).await.unwrap();

        ws.send(Message::Binary(
            br#"{"jsonrpc":"2.0","id":2,"method":"reverse","params":{"message":"ab"}}"#
                .to_vec()
                .into(),
        ))
        .await
        .unwrap();
        let Some(Ok(Message::Text(text))) = ws.next().await else {
            panic!("expected a text reply");
        };
        let reply: Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(reply["result"], json!({"reverse": "ba"}));
    }

    #[tokio::test]
    async fn test_unknown_path_is_rejected() {
        let addr = start(TetherServer::builder().build()).await;
        let result = connect_async(format!("ws://{}/elsewhere", addr)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_serve_with_shutdown_returns() {
        let server = TetherServer::builder().build();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let result = server.serve_with_shutdown(listener, async {}).await;
        assert!(result.is_ok());
    }
}
