//! Gateway metrics — request counters, response time EMA and service health
//!
//! Counters are monotonic for the life of the process. The response time is an
//! exponential moving average (α = 0.1) seeded by the first sample.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

/// Smoothing factor of the response time average
pub const EMA_ALPHA: f64 = 0.1;

/// Health of one service as of the last probe pass
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealth {
    /// Configured instances
    pub total: usize,
    /// Instances that passed their last probe
    pub healthy: usize,
    /// healthy / total
    pub ratio: f64,
}

impl ServiceHealth {
    pub fn new(total: usize, healthy: usize) -> Self {
        let ratio = if total == 0 {
            0.0
        } else {
            healthy as f64 / total as f64
        };
        Self {
            total,
            healthy,
            ratio,
        }
    }
}

/// Metrics snapshot — a point-in-time view of all metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Requests that went through the metrics stage
    pub total_requests: u64,
    /// Requests answered with a status below 400
    pub successful_requests: u64,
    /// Requests answered with a status of 400 or above
    pub failed_requests: u64,
    /// Moving average of the response time, in seconds
    pub average_response_time: f64,
    /// Per-service health
    pub service_health: HashMap<String, ServiceHealth>,
}

impl MetricsSnapshot {
    /// successful / total, 0.0 before the first request
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.successful_requests as f64 / self.total_requests as f64
    }
}

/// Gateway metrics collector
pub struct GatewayMetrics {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    /// f64 bits of the average, NaN until the first sample
    average_response_time: AtomicU64,
    service_health: RwLock<HashMap<String, ServiceHealth>>,
}

impl GatewayMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            successful_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
            average_response_time: AtomicU64::new(f64::NAN.to_bits()),
            service_health: RwLock::new(HashMap::new()),
        }
    }

    /// Record a completed request
    pub fn record_request(&self, success: bool, elapsed: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
        self.record_response_time(elapsed.as_secs_f64());
    }

    fn record_response_time(&self, sample: f64) {
        // fetch_update only fails when the closure returns None
        let _ = self.average_response_time.fetch_update(
            Ordering::AcqRel,
            Ordering::Acquire,
            |bits| {
                let previous = f64::from_bits(bits);
                let next = if previous.is_nan() {
                    sample
                } else {
                    ema(previous, sample)
                };
                Some(next.to_bits())
            },
        );
    }

    /// Replace the health entry of one service
    pub fn set_service_health(&self, service: &str, health: ServiceHealth) {
        let mut map = self
            .service_health
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        map.insert(service.to_string(), health);
    }

    /// Get total requests
    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    /// Current response time average in seconds, 0.0 before the first request
    pub fn average_response_time(&self) -> f64 {
        let average = f64::from_bits(self.average_response_time.load(Ordering::Acquire));
        if average.is_nan() {
            0.0
        } else {
            average
        }
    }

    /// Take a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            average_response_time: self.average_response_time(),
            service_health: self
                .service_health
                .read()
                .map(|m| m.clone())
                .unwrap_or_else(|poisoned| poisoned.into_inner().clone()),
        }
    }
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// One step of the exponential moving average
pub fn ema(previous: f64, sample: f64) -> f64 {
    EMA_ALPHA * sample + (1.0 - EMA_ALPHA) * previous
}
