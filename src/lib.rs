//! # Trade Gateway
//!
//! A load-balancing reverse proxy that fronts a trading platform: the web
//! application and the trading engine, each with one or more instances.
//!
//! ## Architecture
//!
//! ```text
//! Entrypoint → Middleware Pipeline → Status API | Stream Relay | Router → Service (Round Robin) → Backend
//! ```
//!
//! ## Core Features
//!
//! - **Round-robin balancing** over the healthy instances of each service
//! - **Active health checks**: periodic HTTP probes, instances leave and rejoin rotation
//! - **Rate limiting**: fixed-window counters per client and category, kept in Redis
//! - **WebSocket relay**: `/ws` upgrades relayed to a streaming backend
//! - **CORS**, request IDs, access logging and a JSON status API under `/lb`
//! - **Metrics persistence**: periodic snapshots written to the counter store
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use trade_gateway::{Gateway, config::GatewayConfig};
//!
//! #[tokio::main]
//! async fn main() -> trade_gateway::Result<()> {
//!     let mut config = GatewayConfig::from_file("gateway.hcl").await?;
//!     config.apply_env_overrides()?;
//!     let gateway = Gateway::new(config)?;
//!     gateway.start().await?;
//!     gateway.wait_for_shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dashboard;
pub(crate) mod entrypoint;
pub mod error;
pub mod gateway;
pub(crate) mod middleware;
pub mod observability;
pub(crate) mod proxy;
pub(crate) mod router;
pub mod service;
pub mod store;

// Re-export main types
pub use error::{GatewayError, Result};
pub use gateway::Gateway;

use serde::{Deserialize, Serialize};

/// Gateway lifecycle state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayState {
    /// Gateway has been created but not yet started
    #[default]
    Created,
    /// Gateway is binding its listener and spawning background tasks
    Starting,
    /// Gateway is accepting and proxying requests
    Running,
    /// Gateway is stopping its background tasks
    Stopping,
    /// Gateway has fully stopped
    Stopped,
}

impl std::fmt::Display for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Gateway health status snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Current gateway state
    pub state: GatewayState,
    /// Uptime in seconds since the gateway was created
    pub uptime_secs: u64,
    /// Total requests handled since start
    pub total_requests: u64,
    /// Services with at least one healthy instance
    pub available_services: usize,
}
