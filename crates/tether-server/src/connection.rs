//! One WebSocket connection: handshake, per-frame routing, reply writing.

use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tether_json_rpc_server::JsonRpcRouter;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_hdr_async_with_config;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tracing::{debug, info, trace, warn};

use crate::Result;
use crate::config::ServerConfig;
use crate::server::ServerMetrics;

/// Upgrade `stream` and serve it until the peer goes away.
pub(crate) async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    router: JsonRpcRouter,
    config: Arc<ServerConfig>,
    metrics: Arc<ServerMetrics>,
) -> Result<()> {
    let ws_config = WebSocketConfig::default().max_message_size(Some(config.max_message_size));
    let path = config.ws_path.clone();
    let check_path = move |request: &Request, response: Response| {
        if request.uri().path() == path {
            Ok(response)
        } else {
            debug!(path = %request.uri().path(), "rejecting upgrade on unknown path");
            let mut rejection = ErrorResponse::new(Some("Not Found".to_string()));
            *rejection.status_mut() = StatusCode::NOT_FOUND;
            Err(rejection)
        }
    };

    let ws = accept_hdr_async_with_config(stream, check_path, Some(ws_config)).await?;
    info!(%peer, "WebSocket connection opened");
    let _guard = metrics.connection_opened();

    let (mut ws_tx, mut ws_rx) = ws.split();
    let (replies_tx, mut replies_rx) = mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        while let Some(reply) = replies_rx.recv().await {
            if let Err(e) = ws_tx.send(Message::Text(reply.into())).await {
                debug!(error = %e, "failed to write reply, dropping connection");
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    while let Some(message) = ws_rx.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                warn!(%peer, error = %e, "WebSocket read failed");
                break;
            }
        };
        match message {
            Message::Text(text) => {
                trace!(%peer, bytes = text.len(), "received text frame");
                let router = router.clone();
                let replies = replies_tx.clone();
                tokio::spawn(async move {
                    if let Some(reply) = router.route(text.as_str()).await {
                        let _ = replies.send(reply);
                    }
                });
            }
            Message::Binary(bytes) => {
                trace!(%peer, bytes = bytes.len(), "received binary frame");
                let router = router.clone();
                let replies = replies_tx.clone();
                tokio::spawn(async move {
                    if let Some(reply) = router.route_binary(bytes.to_vec()).await {
                        let _ = replies.send(reply);
                    }
                });
            }
            Message::Close(frame) => {
                debug!(%peer, ?frame, "close frame received");
                break;
            }
            // ping/pong are answered by tungstenite
            _ => {}
        }
    }

    // the writer drains replies still being produced, then closes
    drop(replies_tx);
    let _ = writer.await;
    info!(%peer, "WebSocket connection closed");
    Ok(())
}
