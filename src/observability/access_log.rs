//! Structured access log — one line per request that reached the metrics stage

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A single access log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessLogEntry {
    /// RFC 3339 timestamp of arrival
    pub timestamp: String,
    /// Id assigned by the load-balancing context stage
    pub request_id: Option<String>,
    /// Client identity used for rate limiting
    pub client_ip: String,
    /// HTTP method
    pub method: String,
    /// Inbound request path
    pub path: String,
    /// HTTP status code returned to the client
    pub status: u16,
    /// Request duration in milliseconds
    pub duration_ms: u64,
    /// Rate limit category the request was counted against
    pub category: Option<String>,
}

impl AccessLogEntry {
    /// Whether the request counts as successful in metrics
    pub fn is_success(&self) -> bool {
        self.status < 400
    }
}

/// Access log emitter
pub struct AccessLog {
    total_entries: AtomicU64,
}

impl AccessLog {
    pub fn new() -> Self {
        Self {
            total_entries: AtomicU64::new(0),
        }
    }

    /// Record and emit a log entry
    pub fn record(&self, entry: &AccessLogEntry) {
        self.total_entries.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            target: "access_log",
            request_id = entry.request_id.as_deref().unwrap_or("-"),
            client_ip = entry.client_ip,
            method = entry.method,
            path = entry.path,
            status = entry.status,
            duration_ms = entry.duration_ms,
            category = entry.category.as_deref().unwrap_or("-"),
            "{}",
            serde_json::to_string(entry).unwrap_or_default()
        );
    }

    /// Number of entries emitted so far
    pub fn total_entries(&self) -> u64 {
        self.total_entries.load(Ordering::Relaxed)
    }
}

impl Default for AccessLog {
    fn default() -> Self {
        Self::new()
    }
}
