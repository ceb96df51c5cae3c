//! Observability — metrics, access logging, and snapshot persistence

pub mod access_log;
pub mod metrics;
pub mod persist;

pub use access_log::{AccessLog, AccessLogEntry};
pub use metrics::{GatewayMetrics, MetricsSnapshot, ServiceHealth};
pub use persist::MetricsPersister;
