//! Simple Calculator JSON-RPC Example
//!
//! Registers two typed methods and routes a handful of frames through the
//! router, printing what would go back over the wire.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tether_json_rpc_server::{JsonRpcRouter, MethodHandler, MethodRegistry};

#[derive(Debug, Deserialize)]
struct Operands {
    a: f64,
    b: f64,
}

/// Adds two numbers
struct AddHandler;

#[async_trait]
impl MethodHandler for AddHandler {
    type Params = Operands;
    type Output = Value;
    type Error = String;

    fn method(&self) -> &str {
        "add"
    }

    async fn handle(&self, params: Operands) -> Result<Value, String> {
        Ok(json!({"result": params.a + params.b}))
    }
}

#[tokio::main]
async fn main() {
    let registry = MethodRegistry::builder()
        .handler(AddHandler)
        .function("divide", |p: Operands| async move {
            if p.b == 0.0 {
                Err("division by zero".to_string())
            } else {
                Ok(json!({"result": p.a / p.b}))
            }
        })
        .build();
    let router = JsonRpcRouter::new(registry);

    let frames = [
        r#"{"jsonrpc":"2.0","id":1,"method":"add","params":{"a":2,"b":3}}"#,
        r#"{"jsonrpc":"2.0","id":2,"method":"divide","params":{"a":1,"b":0}}"#,
        r#"{"jsonrpc":"2.0","id":3,"method":"add","params":[2,3]}"#,
        r#"[{"jsonrpc":"2.0","id":4,"method":"add","params":{"a":1,"b":1}},{"jsonrpc":"2.0","method":"add","params":{"a":0,"b":0}}]"#,
        r#"{"jsonrpc":"2.0","method":"add","params":{"a":0,"b":0}}"#,
    ];

    for frame in frames {
        println!("--> {}", frame);
        match router.route(frame).await {
            Some(reply) => println!("<-- {}", reply),
            None => println!("<-- (no reply)"),
        }
    }
}
