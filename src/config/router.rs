//! Routing configuration — target services and stream relay targets

use serde::{Deserialize, Serialize};

/// Which registered services the classification table routes to
///
/// # Example
///
/// ```hcl
/// routing {
///   trading_service = "trading-engine"
///   default_service = "web"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Service receiving `/api/trading/...` (rewritten to `/api/...`)
    #[serde(default = "default_trading_service")]
    pub trading_service: String,

    /// Service receiving `/api/...` and everything else
    #[serde(default = "default_default_service")]
    pub default_service: String,

    /// Upstream request timeout in seconds (default: 30)
    #[serde(default = "default_proxy_timeout")]
    pub proxy_timeout_secs: u64,
}

fn default_trading_service() -> String {
    "trading-engine".to_string()
}

fn default_default_service() -> String {
    "web".to_string()
}

fn default_proxy_timeout() -> u64 {
    30
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            trading_service: default_trading_service(),
            default_service: default_default_service(),
            proxy_timeout_secs: default_proxy_timeout(),
        }
    }
}

/// WebSocket relay configuration
///
/// # Example
///
/// ```hcl
/// stream {
///   path    = "/ws"
///   targets = ["ws://127.0.0.1:9000"]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Inbound path that is upgraded to a relay
    #[serde(default = "default_stream_path")]
    pub path: String,

    /// Backend stream endpoints; one is picked at random per connection
    #[serde(default)]
    pub targets: Vec<String>,
}

fn default_stream_path() -> String {
    "/ws".to_string()
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            path: default_stream_path(),
            targets: Vec::new(),
        }
    }
}
