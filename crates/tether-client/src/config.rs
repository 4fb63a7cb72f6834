//! Configuration types for the client

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ClientError, ClientResult};

/// Main client configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClientConfig {
    /// WebSocket endpoint, e.g. `ws://127.0.0.1:8080/api/ws`
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Timeout configurations
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Reconnection configurations
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

/// Timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Upper bound on a single connection attempt
    #[serde(with = "duration_serde")]
    pub connect: Duration,

    /// Default deadline for a call, covering the wait for an open
    /// connection and the wait for the reply
    #[serde(with = "duration_serde")]
    pub request: Duration,
}

/// Reconnection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Schedule a new attempt after the connection closes or fails
    pub auto_reconnect: bool,

    /// Delay before the first retry; also the value restored on open
    #[serde(with = "duration_serde")]
    pub initial_delay: Duration,

    /// Cap on the retry delay
    #[serde(with = "duration_serde")]
    pub max_delay: Duration,

    /// Extra random fraction of the delay added on each retry (0.0 - 1.0)
    pub jitter: f64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            request: Duration::from_secs(30),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: 0.0,
        }
    }
}

impl ClientConfig {
    /// Configuration targeting `endpoint` with default timeouts and retries
    pub fn for_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            ..Self::default()
        }
    }

    /// Reject settings the connection manager cannot honour
    pub fn validate(&self) -> ClientResult<()> {
        if self.timeouts.connect.is_zero() {
            return Err(ClientError::config("connect timeout must be positive"));
        }
        if self.timeouts.request.is_zero() {
            return Err(ClientError::config("request timeout must be positive"));
        }
        self.reconnect.validate()
    }
}

impl ReconnectConfig {
    fn validate(&self) -> ClientResult<()> {
        if self.initial_delay.is_zero() {
            return Err(ClientError::config("initial reconnect delay must be positive"));
        }
        if self.max_delay < self.initial_delay {
            return Err(ClientError::config(
                "max reconnect delay must not be below the initial delay",
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ClientError::config("reconnect jitter must be within 0.0..=1.0"));
        }
        Ok(())
    }
}

// Helper module for Duration serialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
