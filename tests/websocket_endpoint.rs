//! End-to-end tests of the WebSocket endpoint using a raw WebSocket client.
//!
//! Each test starts a server on an ephemeral port and speaks JSON-RPC frames
//! to `/api/ws` directly, checking exactly what comes back on the wire.

mod support;

use futures::SinkExt;
use serde_json::json;
use std::collections::HashSet;
use std::time::Duration;
use support::{TestServer, connect_raw, expect_silence, recv_json, send_json, send_text};
use tokio_tungstenite::tungstenite::Message;

#[tokio::test]
async fn test_echo_request() {
    let server = TestServer::start().await.unwrap();
    let mut ws = connect_raw(&server.url()).await.unwrap();

    send_json(
        &mut ws,
        &json!({"jsonrpc":"2.0","id":1,"method":"echo","params":{"message":"hi"}}),
    )
    .await
    .unwrap();

    let reply = recv_json(&mut ws).await.unwrap();
    assert_eq!(reply, json!({"jsonrpc":"2.0","id":1,"result":{"echo":"hi"}}));
}

#[tokio::test]
async fn test_unknown_method() {
    let server = TestServer::start().await.unwrap();
    let mut ws = connect_raw(&server.url()).await.unwrap();

    send_json(&mut ws, &json!({"jsonrpc":"2.0","id":"x","method":"nope"}))
        .await
        .unwrap();

    let reply = recv_json(&mut ws).await.unwrap();
    assert_eq!(reply["id"], "x");
    assert_eq!(reply["error"]["code"], -32601);
    assert!(reply.get("result").is_none());
}

#[tokio::test]
async fn test_wrong_version_is_invalid_request() {
    let server = TestServer::start().await.unwrap();
    let mut ws = connect_raw(&server.url()).await.unwrap();

    send_json(&mut ws, &json!({"jsonrpc":"1.0","id":2,"method":"echo"}))
        .await
        .unwrap();

    let reply = recv_json(&mut ws).await.unwrap();
    assert_eq!(reply["id"], 2);
    assert_eq!(reply["error"]["code"], -32600);
}

#[tokio::test]
async fn test_empty_batch_gets_bare_error() {
    let server = TestServer::start().await.unwrap();
    let mut ws = connect_raw(&server.url()).await.unwrap();

    send_text(&mut ws, "[]").await.unwrap();

    let reply = recv_json(&mut ws).await.unwrap();
    assert!(reply.is_object(), "expected a bare object, got {reply}");
    assert_eq!(reply["jsonrpc"], "2.0");
    assert!(reply["id"].is_null());
    assert_eq!(reply["error"]["code"], -32600);
}

#[tokio::test]
async fn test_parse_error() {
    let server = TestServer::start().await.unwrap();
    let mut ws = connect_raw(&server.url()).await.unwrap();

    send_text(&mut ws, "{not json").await.unwrap();

    let reply = recv_json(&mut ws).await.unwrap();
    assert!(reply["id"].is_null());
    assert_eq!(reply["error"]["code"], -32700);
}

#[tokio::test]
async fn test_notifications_get_no_reply() {
    let server = TestServer::start().await.unwrap();
    let mut ws = connect_raw(&server.url()).await.unwrap();

    // neither a successful nor a failing notification is answered
    send_json(&mut ws, &json!({"jsonrpc":"2.0","method":"echo","params":{"message":"x"}}))
        .await
        .unwrap();
    send_json(&mut ws, &json!({"jsonrpc":"2.0","method":"fail"}))
        .await
        .unwrap();
    send_json(&mut ws, &json!({"jsonrpc":"2.0","method":"nope"}))
        .await
        .unwrap();
    send_text(&mut ws, r#"[{"jsonrpc":"2.0","method":"echo"},{"jsonrpc":"2.0","method":"nope"}]"#)
        .await
        .unwrap();

    assert!(expect_silence(&mut ws, Duration::from_millis(300)).await);

    // the connection is still usable
    send_json(&mut ws, &json!({"jsonrpc":"2.0","id":9,"method":"echo"}))
        .await
        .unwrap();
    assert_eq!(recv_json(&mut ws).await.unwrap()["id"], 9);
}

#[tokio::test]
async fn test_mixed_batch_preserves_order() {
    let server = TestServer::start().await.unwrap();
    let mut ws = connect_raw(&server.url()).await.unwrap();

    let batch = json!([
        {"jsonrpc":"2.0","id":1,"method":"sleep","params":{"ms":150}},
        {"jsonrpc":"2.0","method":"echo","params":{"message":"quiet"}},
        {"jsonrpc":"2.0","id":2,"method":"reverse","params":{"message":"abc"}},
        {"jsonrpc":"2.0","id":3,"method":"nope"},
        {"jsonrpc":"2.0","id":4,"method":"echo","params":[1,2]},
        {"jsonrpc":"2.0","id":5,"method":"fail"},
        {"jsonrpc":"2.0","id":6,"method":"panic"},
        42
    ]);
    send_json(&mut ws, &batch).await.unwrap();

    let reply = recv_json(&mut ws).await.unwrap();
    let replies = reply.as_array().expect("batch reply must be an array");
    assert_eq!(replies.len(), 7);

    assert_eq!(replies[0], json!({"jsonrpc":"2.0","id":1,"result":150}));
    assert_eq!(replies[1]["result"], json!({"reverse":"cba"}));
    assert_eq!(replies[2]["error"]["code"], -32601);
    assert_eq!(replies[3]["error"]["code"], -32602);
    assert_eq!(replies[4]["error"]["code"], -32603);
    assert_eq!(replies[5]["error"]["code"], -32603);
    assert_eq!(replies[6]["error"]["code"], -32600);
    assert!(replies[6]["id"].is_null());

    let ids: Vec<_> = replies[..6].iter().map(|r| r["id"].clone()).collect();
    assert_eq!(ids, vec![json!(1), json!(2), json!(3), json!(4), json!(5), json!(6)]);
}

#[tokio::test]
async fn test_all_notification_batch_gets_no_reply() {
    let server = TestServer::start().await.unwrap();
    let mut ws = connect_raw(&server.url()).await.unwrap();

    send_json(
        &mut ws,
        &json!([
            {"jsonrpc":"2.0","method":"echo"},
            {"jsonrpc":"2.0","method":"reverse","params":{"message":"x"}}
        ]),
    )
    .await
    .unwrap();
    assert!(expect_silence(&mut ws, Duration::from_millis(300)).await);
}

#[tokio::test]
async fn test_frames_are_handled_concurrently() {
    let server = TestServer::start().await.unwrap();
    let mut ws = connect_raw(&server.url()).await.unwrap();

    send_json(&mut ws, &json!({"jsonrpc":"2.0","id":"slow","method":"sleep","params":{"ms":300}}))
        .await
        .unwrap();
    send_json(&mut ws, &json!({"jsonrpc":"2.0","id":"fast","method":"echo","params":{"message":"go"}}))
        .await
        .unwrap();

    // the fast reply overtakes the slow one
    assert_eq!(recv_json(&mut ws).await.unwrap()["id"], "fast");
    assert_eq!(recv_json(&mut ws).await.unwrap()["id"], "slow");
}

#[tokio::test]
async fn test_binary_frames() {
    let server = TestServer::start().await.unwrap();
    let mut ws = connect_raw(&server.url()).await.unwrap();

    let frame = br#"{"jsonrpc":"2.0","id":7,"method":"reverse","params":{"message":"hello"}}"#;
    ws.send(Message::Binary(frame.to_vec().into())).await.unwrap();
    let reply = recv_json(&mut ws).await.unwrap();
    assert_eq!(reply["result"], json!({"reverse":"olleh"}));

    ws.send(Message::Binary(vec![0xc3, 0x28].into())).await.unwrap();
    let reply = recv_json(&mut ws).await.unwrap();
    assert_eq!(reply["error"]["code"], -32700);
}

#[tokio::test]
async fn test_connections_are_independent() {
    let server = TestServer::start().await.unwrap();
    let mut first = connect_raw(&server.url()).await.unwrap();
    let mut second = connect_raw(&server.url()).await.unwrap();

    send_json(&mut first, &json!({"jsonrpc":"2.0","id":1,"method":"echo","params":{"message":"one"}}))
        .await
        .unwrap();
    send_json(&mut second, &json!({"jsonrpc":"2.0","id":1,"method":"echo","params":{"message":"two"}}))
        .await
        .unwrap();

    assert_eq!(recv_json(&mut first).await.unwrap()["result"]["echo"], "one");
    assert_eq!(recv_json(&mut second).await.unwrap()["result"]["echo"], "two");
    assert_eq!(server.server().stats().total_connections, 2);
}

#[tokio::test]
async fn test_many_concurrent_requests_each_answered_once() {
    let server = TestServer::start().await.unwrap();
    let mut ws = connect_raw(&server.url()).await.unwrap();

    for i in 0..50 {
        send_json(&mut ws, &json!({"jsonrpc":"2.0","id":i,"method":"echo","params":{"message":i.to_string()}}))
            .await
            .unwrap();
    }

    let mut seen = HashSet::new();
    for _ in 0..50 {
        let reply = recv_json(&mut ws).await.unwrap();
        let id = reply["id"].as_i64().unwrap();
        assert_eq!(reply["result"]["echo"], id.to_string());
        assert!(seen.insert(id), "duplicate reply for {id}");
    }
    assert!(expect_silence(&mut ws, Duration::from_millis(100)).await);
}

#[tokio::test]
async fn test_other_paths_are_refused() {
    let server = TestServer::start().await.unwrap();
    let result = connect_raw(&format!("ws://{}/not-here", server.addr())).await;
    assert!(result.is_err());
}
