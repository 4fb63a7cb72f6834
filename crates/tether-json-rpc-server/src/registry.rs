//! Method registry: method name → descriptor {decode step, async invoke}.
//!
//! The registry is built once, explicitly, from a list of handlers and is
//! read-only afterwards. Each descriptor owns a decode function that binds the
//! raw `params` value onto the handler's declared `Params` type, so binding is a
//! plain `serde` step chosen at registration time.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

/// Description of a failed handler invocation, carried in `-32603` responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure(String);

impl HandlerFailure {
    pub fn new(description: impl Into<String>) -> Self {
        Self(description.into())
    }

    pub fn description(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Future returned by a bound method invocation.
pub type InvokeFuture = BoxFuture<'static, Result<Value, HandlerFailure>>;

type BindFn = dyn Fn(Value) -> Result<InvokeFuture, serde_json::Error> + Send + Sync;

/// Trait for a single JSON-RPC method with typed parameters and result.
#[async_trait]
pub trait MethodHandler: Send + Sync + 'static {
    /// Named-parameter shape; decoded from the request's `params` object.
    type Params: DeserializeOwned + Send + 'static;
    /// Result value, encoded into the response's `result`.
    type Output: Serialize + Send + 'static;
    /// Domain failure; its `Display` text becomes the `-32603` error data.
    type Error: fmt::Display + Send + 'static;

    /// The method name this handler answers to.
    fn method(&self) -> &str;

    async fn handle(&self, params: Self::Params) -> Result<Self::Output, Self::Error>;
}

/// Registered method: its name and the bind-then-invoke step.
pub struct MethodDescriptor {
    name: String,
    bind: Box<BindFn>,
}

impl MethodDescriptor {
    /// Describe a [`MethodHandler`] implementation.
    pub fn from_handler<H>(handler: H) -> Self
    where
        H: MethodHandler,
    {
        let name = handler.method().to_string();
        let handler = Arc::new(handler);
        Self {
            name,
            bind: Box::new(move |raw: Value| {
                let params: H::Params = serde_json::from_value(raw)?;
                let handler = Arc::clone(&handler);
                Ok(Box::pin(async move {
                    let output = handler
                        .handle(params)
                        .await
                        .map_err(|e| HandlerFailure::new(e.to_string()))?;
                    encode_output(output)
                }) as InvokeFuture)
            }),
        }
    }

    /// Describe a closure-based method.
    pub fn from_fn<P, R, E, F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        E: fmt::Display + Send + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        Self {
            name: name.into(),
            bind: Box::new(move |raw: Value| {
                let params: P = serde_json::from_value(raw)?;
                let fut = f(params);
                Ok(Box::pin(async move {
                    let output = fut.await.map_err(|e| HandlerFailure::new(e.to_string()))?;
                    encode_output(output)
                }) as InvokeFuture)
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Decode `params` onto the method's parameter type and return the
    /// pending invocation. A decode failure means the call never runs.
    pub fn bind(&self, params: Value) -> Result<InvokeFuture, serde_json::Error> {
        (self.bind)(params)
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

fn encode_output<R: Serialize>(output: R) -> Result<Value, HandlerFailure> {
    serde_json::to_value(output)
        .map_err(|e| HandlerFailure::new(format!("failed to encode result: {}", e)))
}

/// Read-only mapping from method name to descriptor.
#[derive(Debug, Default)]
pub struct MethodRegistry {
    methods: HashMap<String, MethodDescriptor>,
}

impl MethodRegistry {
    /// Build a registry from an explicit list of descriptors.
    ///
    /// A later descriptor with an already registered name replaces the earlier
    /// one.
    pub fn new(descriptors: impl IntoIterator<Item = MethodDescriptor>) -> Self {
        let mut methods = HashMap::new();
        for descriptor in descriptors {
            debug!(method = %descriptor.name, "registering JSON-RPC method");
            if let Some(previous) = methods.insert(descriptor.name.clone(), descriptor) {
                warn!(method = %previous.name, "duplicate method registration, keeping the last one");
            }
        }
        Self { methods }
    }

    pub fn builder() -> MethodRegistryBuilder {
        MethodRegistryBuilder::default()
    }

    pub fn get(&self, method: &str) -> Option<&MethodDescriptor> {
        self.methods.get(method)
    }

    pub fn contains(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    /// Get all registered method names, sorted
    pub fn registered_methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// Collects descriptors before the registry is frozen.
#[derive(Debug, Default)]
pub struct MethodRegistryBuilder {
    descriptors: Vec<MethodDescriptor>,
}

impl MethodRegistryBuilder {
    /// Register a [`MethodHandler`]
    pub fn handler<H>(mut self, handler: H) -> Self
    where
        H: MethodHandler,
    {
        self.descriptors.push(MethodDescriptor::from_handler(handler));
        self
    }

    /// Register a closure under `name`
    pub fn function<P, R, E, F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        E: fmt::Display + Send + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        self.descriptors.push(MethodDescriptor::from_fn(name, f));
        self
    }

    /// Register a prepared descriptor
    pub fn descriptor(mut self, descriptor: MethodDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn build(self) -> MethodRegistry {
        MethodRegistry::new(self.descriptors)
    }
}
