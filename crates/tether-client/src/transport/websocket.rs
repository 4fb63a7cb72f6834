//! WebSocket transport over `tokio-tungstenite`

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace, warn};
use url::Url;

use super::{Frame, Link, Transport, TransportType};
use crate::error::{ClientResult, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens one WebSocket connection per [`Transport::open`] call.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    endpoint: String,
}

impl WebSocketTransport {
    /// Create a transport for a `ws://` or `wss://` URL.
    pub fn new(endpoint: &str) -> ClientResult<Self> {
        let url = Url::parse(endpoint)
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", endpoint, e)))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(TransportError::Unsupported(format!(
                "WebSocket transport requires ws:// or wss://, got {}://",
                url.scheme()
            ))
            .into());
        }
        Ok(Self {
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::WebSocket
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn open(&self) -> Result<Link, TransportError> {
        debug!(endpoint = %self.endpoint, "opening WebSocket");
        let (ws, _response) = connect_async(self.endpoint.as_str())
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        tokio::spawn(pump(ws, outbound_rx, inbound_tx));

        Ok(Link {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

/// Moves frames between the socket and the link channels until either side
/// goes away.
async fn pump(
    ws: WsStream,
    mut outbound: mpsc::UnboundedReceiver<String>,
    inbound: mpsc::UnboundedSender<Result<Frame, TransportError>>,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    loop {
        tokio::select! {
            text = outbound.recv() => {
                let Some(text) = text else {
                    // link dropped locally
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                };
                trace!(bytes = text.len(), "sending frame");
                if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                    let _ = inbound.send(Err(TransportError::WebSocket(e.to_string())));
                    break;
                }
            }
            message = ws_rx.next() => {
                let frame = match message {
                    Some(Ok(Message::Text(text))) => Frame::Text(text.as_str().to_owned()),
                    Some(Ok(Message::Binary(bytes))) => Frame::Binary(bytes.to_vec()),
                    Some(Ok(Message::Close(reason))) => {
                        debug!(?reason, "WebSocket closed by peer");
                        break;
                    }
                    // ping/pong are answered by tungstenite
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket read failed");
                        let _ = inbound.send(Err(TransportError::WebSocket(e.to_string())));
                        break;
                    }
                    None => break,
                };
                if inbound.send(Ok(frame)).is_err() {
                    // nobody is reading any more
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_websocket_scheme() {
        assert!(WebSocketTransport::new("http://localhost/api/ws").is_err());
        assert!(WebSocketTransport::new("::not a url").is_err());
    }

    #[tokio::test]
    async fn test_open_fails_without_server() {
        // port 9 (discard) is not expected to accept WebSocket upgrades
        let transport = WebSocketTransport::new("ws://127.0.0.1:9/api/ws").unwrap();
        let err = transport.open().await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionFailed(_)));
    }
}
