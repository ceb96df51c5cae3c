//! Centralized error types for the trading gateway

use thiserror::Error;

/// Gateway error types
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Invalid or inconsistent configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// The named service has no healthy instance right now
    #[error("No healthy instances available for service '{0}'")]
    NoHealthyInstance(String),

    /// Upstream did not answer within the proxy timeout (milliseconds)
    #[error("Upstream timed out after {0}ms")]
    UpstreamTimeout(u64),

    /// Upstream connection or transport failure
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Counter store (Redis) failure
    #[error("Counter store error: {0}")]
    Store(#[from] redis::RedisError),

    /// WebSocket protocol or transport failure
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl GatewayError {
    /// HTTP status this error maps to when it reaches a client
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NoHealthyInstance(_) => 503,
            Self::UpstreamTimeout(_) | Self::Upstream(_) | Self::Http(_) => 502,
            _ => 500,
        }
    }

    /// Stable JSON error body for client-facing responses
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::NoHealthyInstance(_) => serde_json::json!({ "error": self.to_string() }),
            Self::UpstreamTimeout(_) | Self::Upstream(_) | Self::Http(_) => serde_json::json!({
                "error": "Bad gateway",
                "details": self.to_string(),
            }),
            _ => serde_json::json!({ "error": "Internal server error" }),
        }
    }
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, GatewayError>;
