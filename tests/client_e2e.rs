//! End-to-end tests of [`RpcClient`] against a live server.

mod support;

use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use support::{TestServer, init_tracing};
use tether_client::{
    ClientConfig, ClientError, ConnectionEvent, ConnectionState, ReconnectConfig, RpcClient,
};
use tether_json_rpc_server::{JsonRpcRouter, MethodRegistry};
use tether_server::handlers::register_demo_methods;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio_stream::StreamExt;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

fn client_for(url: &str) -> RpcClient {
    RpcClient::builder()
        .with_url(url)
        .unwrap()
        .build()
        .unwrap()
}

fn fast_reconnect() -> ClientConfig {
    ClientConfig {
        reconnect: ReconnectConfig {
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(200),
            ..ReconnectConfig::default()
        },
        ..ClientConfig::default()
    }
}

#[tokio::test]
async fn test_call_round_trip() {
    let server = TestServer::start().await.unwrap();
    let client = client_for(&server.url());
    tokio_test::assert_ok!(client.connect().await);
    assert_eq!(client.state(), ConnectionState::Open);

    let echoed = client
        .call("echo", Some(json!({"message": "hi"})))
        .await
        .unwrap();
    assert_eq!(echoed, json!({"echo": "hi"}));

    let reversed = client
        .call("reverse", Some(json!({"message": "stressed"})))
        .await
        .unwrap();
    assert_eq!(reversed, json!({"reverse": "desserts"}));
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test]
async fn test_call_typed() {
    #[derive(Debug, Deserialize)]
    struct Echo {
        echo: Option<String>,
    }

    let server = TestServer::start().await.unwrap();
    let client = client_for(&server.url());

    // the first call connects on its own
    let echo: Echo = client.call_typed("echo", None).await.unwrap();
    assert_eq!(echo.echo, None);
    let echo: Echo = client
        .call_typed("echo", Some(json!({"message": "typed"})))
        .await
        .unwrap();
    assert_eq!(echo.echo.as_deref(), Some("typed"));
}

#[tokio::test]
async fn test_server_errors_are_surfaced() {
    let server = TestServer::start().await.unwrap();
    let client = client_for(&server.url());

    let err = client.call("nope", None).await.unwrap_err();
    assert_eq!(err.error_code(), Some(-32601));

    let err = client.call("echo", Some(json!([1]))).await.unwrap_err();
    assert_eq!(err.error_code(), Some(-32602));

    let err = client.call("fail", None).await.unwrap_err();
    match err {
        ClientError::ServerError { code, data, .. } => {
            assert_eq!(code, -32603);
            assert_eq!(data, Some(json!("deliberate failure")));
        }
        other => panic!("expected a server error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_concurrent_calls_are_correlated() {
    let server = TestServer::start().await.unwrap();
    let client = client_for(&server.url());
    client.connect().await.unwrap();

    let slow = client.call("sleep", Some(json!({"ms": 200})));
    let calls = futures::future::join_all(
        (0..20).map(|i| client.call("echo", Some(json!({"message": format!("m{i}")})))),
    );
    let (slow, results) = tokio::join!(slow, calls);

    assert_eq!(slow.unwrap(), json!(200));
    for (i, result) in results.into_iter().enumerate() {
        assert_eq!(result.unwrap()["echo"], format!("m{i}"));
    }
}

#[tokio::test]
async fn test_reply_timeout() {
    let server = TestServer::start().await.unwrap();
    let client = client_for(&server.url());
    client.connect().await.unwrap();

    let err = client
        .call_with_timeout("sleep", Some(json!({"ms": 2000})), Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Timeout));
    assert_eq!(client.pending_count(), 0);

    // the late reply is dropped and the connection stays usable
    let echoed = client.call("echo", Some(json!({"message": "still here"}))).await;
    assert_eq!(echoed.unwrap()["echo"], "still here");
}

#[tokio::test]
async fn test_call_while_handshake_hangs_never_transmits() {
    init_tracing();
    // accepts TCP but never completes the WebSocket handshake
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let received = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut seen = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            match tokio::time::timeout(Duration::from_millis(500), socket.read(&mut buf)).await {
                Ok(Ok(n)) if n > 0 => seen.extend_from_slice(&buf[..n]),
                _ => break,
            }
        }
        String::from_utf8_lossy(&seen).into_owned()
    });

    let client = client_for(&format!("ws://{}/api/ws", addr));
    let err = client
        .call_with_timeout("echo", Some(json!({"message": "lost"})), Duration::from_millis(200))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Timeout));
    assert_eq!(client.pending_count(), 0);
    assert_ne!(client.state(), ConnectionState::Open);

    let seen = received.await.unwrap();
    assert!(seen.starts_with("GET /api/ws"), "expected a handshake, got {seen:?}");
    assert!(!seen.contains("\"method\""));
}

#[tokio::test]
async fn test_call_against_refused_port_times_out() {
    init_tracing();
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let client = client_for(&format!("ws://{}/api/ws", addr));
    let err = client
        .call_with_timeout("echo", None, Duration::from_millis(300))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Timeout));
    assert_eq!(client.pending_count(), 0);
    assert!(client.state().is_down() || client.state() == ConnectionState::Connecting);
}

#[tokio::test]
async fn test_reconnects_after_server_drops_connection() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = JsonRpcRouter::new(register_demo_methods(MethodRegistry::builder()).build());

    let server = tokio::spawn(async move {
        // first connection: complete the handshake, then hang up
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        drop(ws);

        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        while let Some(Ok(message)) = futures::StreamExt::next(&mut ws).await {
            if let Message::Text(text) = message {
                if let Some(reply) = router.route(text.as_str()).await {
                    futures::SinkExt::send(&mut ws, Message::Text(reply.into()))
                        .await
                        .unwrap();
                }
            }
        }
    });

    let client = RpcClient::builder()
        .with_url(&format!("ws://{}/api/ws", addr))
        .unwrap()
        .with_config(fast_reconnect())
        .build()
        .unwrap();

    let mut events = client.manager().subscribe();
    client.connect().await.unwrap();

    let mut seen = Vec::new();
    let mut opens = 0;
    while opens < 2 {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for reconnect")
            .expect("event stream ended");
        if let ConnectionEvent::StateChanged { state, .. } = event {
            seen.push(state);
            if state == ConnectionState::Open {
                opens += 1;
            }
        }
    }
    // an abrupt hang-up may be reported as closed or as an error
    assert_eq!(seen.len(), 5, "states seen: {seen:?}");
    assert_eq!(&seen[..2], &[ConnectionState::Connecting, ConnectionState::Open]);
    assert!(seen[2].is_down(), "states seen: {seen:?}");
    assert_eq!(&seen[3..], &[ConnectionState::Connecting, ConnectionState::Open]);

    let echoed = client.call("echo", Some(json!({"message": "again"}))).await;
    assert_eq!(echoed.unwrap()["echo"], "again");

    client.close();
    server.abort();
}

#[tokio::test]
async fn test_close_rejects_pending_calls() {
    let server = TestServer::start().await.unwrap();
    let client = client_for(&server.url());
    client.connect().await.unwrap();

    let calls = futures::future::join_all(
        (0..5).map(|_| client.call("sleep", Some(json!({"ms": 5000})))),
    );
    let closer = async {
        while client.pending_count() < 5 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        client.close();
    };
    let (results, ()) = tokio::join!(calls, closer);

    assert_eq!(results.len(), 5);
    for result in results {
        assert!(matches!(result, Err(ClientError::ConnectionClosed)));
    }
    assert_eq!(client.pending_count(), 0);
    assert_eq!(client.state(), ConnectionState::Idle);
}

#[tokio::test]
async fn test_state_stream_follows_connect_and_close() {
    let server = TestServer::start().await.unwrap();
    let client = client_for(&server.url());
    let mut states = client.state_stream();
    assert_eq!(states.next().await, Some(ConnectionState::Idle));

    client.connect().await.unwrap();
    let open = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(state) = states.next().await {
            if state.is_open() {
                return true;
            }
        }
        false
    })
    .await;
    assert_eq!(open.ok(), Some(true));

    client.close();
    let idle = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(state) = states.next().await {
            if state == ConnectionState::Idle {
                return true;
            }
        }
        false
    })
    .await;
    assert_eq!(idle.ok(), Some(true));
}

#[tokio::test]
async fn test_status_reports_connection() {
    let server = TestServer::start().await.unwrap();
    let client = client_for(&server.url());
    assert!(!client.status().is_ready());

    client.connect().await.unwrap();
    let status = client.status();
    assert!(status.is_ready());
    assert_eq!(status.endpoint, server.url());
    assert!(status.summary().contains("open"));
}
