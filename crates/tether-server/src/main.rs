//! # Tether Server
//!
//! Serves the `echo` and `reverse` demo methods over JSON-RPC 2.0 on a
//! WebSocket endpoint.
//!
//! ## Usage
//! ```bash
//! cargo run --package tether-server -- --bind 127.0.0.1:8080 --path /api/ws
//! ```
//!
//! ## Trying it out
//! ```bash
//! websocat ws://127.0.0.1:8080/api/ws
//! {"jsonrpc":"2.0","id":1,"method":"reverse","params":{"message":"hello"}}
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use tether_server::{ServerConfig, TetherServer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Path WebSocket upgrades are accepted on
    #[arg(short, long, default_value = "/api/ws")]
    path: String,

    /// Log level used when RUST_LOG is not set
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Maximum inbound message size in bytes
    #[arg(long, default_value_t = 1024 * 1024)]
    max_message_size: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .context("invalid log level")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting tether JSON-RPC server");
    let server = TetherServer::builder()
        .config(ServerConfig {
            bind_address: args.bind,
            ws_path: args.path,
            max_message_size: args.max_message_size,
        })
        .with_demo_methods()
        .build();

    let listener = server.bind().await.context("failed to bind")?;
    server
        .serve_with_shutdown(listener, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!("Server stopped");
    Ok(())
}
