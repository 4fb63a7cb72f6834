//! Demo methods: `echo` and `reverse`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tether_json_rpc_server::{MethodHandler, MethodRegistryBuilder};

/// `{"message": ...}`; a missing message is treated as absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageParams {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EchoResult {
    pub echo: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReverseResult {
    pub reverse: Option<String>,
}

/// Returns the message unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoHandler;

#[async_trait]
impl MethodHandler for EchoHandler {
    type Params = MessageParams;
    type Output = EchoResult;
    type Error = Infallible;

    fn method(&self) -> &str {
        "echo"
    }

    async fn handle(&self, params: MessageParams) -> Result<EchoResult, Infallible> {
        Ok(EchoResult {
            echo: params.message,
        })
    }
}

/// Returns the message with its characters in reverse order
#[derive(Debug, Clone, Copy, Default)]
pub struct ReverseHandler;

#[async_trait]
impl MethodHandler for ReverseHandler {
    type Params = MessageParams;
    type Output = ReverseResult;
    type Error = Infallible;

    fn method(&self) -> &str {
        "reverse"
    }

    async fn handle(&self, params: MessageParams) -> Result<ReverseResult, Infallible> {
        Ok(ReverseResult {
            reverse: params.message.map(|m| m.chars().rev().collect()),
        })
    }
}

/// Add both demo methods to a registry under construction
pub fn register_demo_methods(builder: MethodRegistryBuilder) -> MethodRegistryBuilder {
    builder.handler(EchoHandler).handler(ReverseHandler)
}
