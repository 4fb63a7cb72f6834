//! Shared helpers for the end-to-end tests
#![allow(dead_code)]

use anyhow::{Context, Result, anyhow};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::net::SocketAddr;
use std::time::Duration;
use tether_server::TetherServer;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing_subscriber::EnvFilter;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Deserialize)]
struct SleepParams {
    ms: u64,
}

/// Demo server plus a few methods for exercising failure paths, bound on an
/// ephemeral port.
pub struct TestServer {
    addr: SocketAddr,
    server: TetherServer,
    task: JoinHandle<tether_server::Result<()>>,
}

impl TestServer {
    pub async fn start() -> Result<Self> {
        init_tracing();
        let server = TetherServer::builder()
            .with_demo_methods()
            .function("fail", |_: Value| async {
                Err::<Value, _>("deliberate failure")
            })
            .function("sleep", |p: SleepParams| async move {
                tokio::time::sleep(Duration::from_millis(p.ms)).await;
                Ok::<_, String>(p.ms)
            })
            .function("panic", |_: Value| async {
                if true {
                    panic!("handler blew up");
                }
                Ok::<Value, String>(Value::Null)
            })
            .build();

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind test listener")?;
        let addr = listener.local_addr()?;
        let task = tokio::spawn({
            let server = server.clone();
            async move { server.serve(listener).await }
        });

        Ok(Self { addr, server, task })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn url(&self) -> String {
        format!("ws://{}/api/ws", self.addr)
    }

    pub fn server(&self) -> &TetherServer {
        &self.server
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub async fn connect_raw(url: &str) -> Result<WsStream> {
    let (ws, _) = connect_async(url)
        .await
        .with_context(|| format!("failed to connect to {}", url))?;
    Ok(ws)
}

pub async fn send_text(ws: &mut WsStream, text: impl Into<String>) -> Result<()> {
    ws.send(Message::Text(text.into().into())).await?;
    Ok(())
}

pub async fn send_json(ws: &mut WsStream, value: &Value) -> Result<()> {
    send_text(ws, value.to_string()).await
}

/// Next text frame as JSON, failing after five seconds
pub async fn recv_json(ws: &mut WsStream) -> Result<Value> {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .context("timed out waiting for a frame")?
            .ok_or_else(|| anyhow!("connection closed"))??;
        match message {
            Message::Text(text) => return Ok(serde_json::from_str(text.as_str())?),
            Message::Binary(bytes) => return Ok(serde_json::from_slice(&bytes)?),
            Message::Close(frame) => return Err(anyhow!("connection closed: {:?}", frame)),
            _ => continue,
        }
    }
}

/// True if nothing arrives within `wait`
pub async fn expect_silence(ws: &mut WsStream, wait: Duration) -> bool {
    tokio::time::timeout(wait, ws.next()).await.is_err()
}
