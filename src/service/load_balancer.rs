//! Load balancer — round-robin selection over a service's healthy instances
//!
//! The healthy subset is an immutable snapshot that the health checker replaces
//! as a whole. Selection reads the snapshot once, so a concurrent health update
//! can never be observed half-applied or shrink the set under an index.

use crate::config::ServiceConfig;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// A single backend instance
#[derive(Debug)]
pub struct ServiceInstance {
    /// Instance base URL
    pub address: String,
    /// Health as of the last completed probe pass
    healthy: AtomicBool,
}

impl ServiceInstance {
    fn new(address: String) -> Self {
        Self {
            address,
            healthy: AtomicBool::new(true),
        }
    }

    /// Check if this instance passed its last probe
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }
}

type Snapshot = Arc<Vec<Arc<ServiceInstance>>>;

/// A named backend pool
pub struct Service {
    /// Service name
    pub name: String,
    /// Path probed by the health checker
    pub health_path: String,
    /// Every configured instance, in configuration order
    instances: Vec<Arc<ServiceInstance>>,
    /// Healthy subset, replaced wholesale
    healthy: RwLock<Snapshot>,
    /// Round-robin cursor
    cursor: AtomicUsize,
}

impl Service {
    /// Create a service; every instance starts healthy
    pub fn new(name: impl Into<String>, config: &ServiceConfig) -> Self {
        let instances: Vec<Arc<ServiceInstance>> = config
            .instances
            .iter()
            .map(|addr| Arc::new(ServiceInstance::new(addr.clone())))
            .collect();

        Self {
            name: name.into(),
            health_path: config.health_path.clone(),
            healthy: RwLock::new(Arc::new(instances.clone())),
            instances,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Select the next healthy instance, or `None` when none is healthy
    pub fn select_instance(&self) -> Option<Arc<ServiceInstance>> {
        let snapshot = self.healthy_snapshot();
        if snapshot.is_empty() {
            return None;
        }
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % snapshot.len();
        snapshot.get(idx).cloned()
    }

    /// The current healthy subset
    pub fn healthy_snapshot(&self) -> Snapshot {
        self.healthy
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Replace the healthy subset from one probe pass.
    ///
    /// `results` is indexed like [`Service::instances`]; missing entries count
    /// as unhealthy. Returns the instances whose health changed.
    pub fn apply_health(&self, results: &[bool]) -> Vec<(Arc<ServiceInstance>, bool)> {
        let mut changed = Vec::new();
        let mut next = Vec::with_capacity(self.instances.len());

        for (i, instance) in self.instances.iter().enumerate() {
            let healthy = results.get(i).copied().unwrap_or(false);
            if instance.healthy.swap(healthy, Ordering::Relaxed) != healthy {
                changed.push((instance.clone(), healthy));
            }
            if healthy {
                next.push(instance.clone());
            }
        }

        let next = Arc::new(next);
        match self.healthy.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
        changed
    }

    /// All instances (for health checking and status)
    pub fn instances(&self) -> &[Arc<ServiceInstance>] {
        &self.instances
    }

    /// Number of healthy instances
    pub fn healthy_count(&self) -> usize {
        self.healthy_snapshot().len()
    }

    /// Total number of instances
    pub fn total_count(&self) -> usize {
        self.instances.len()
    }

    /// Healthy / total, 0.0 for an empty service
    pub fn health_ratio(&self) -> f64 {
        if self.instances.is_empty() {
            return 0.0;
        }
        self.healthy_count() as f64 / self.total_count() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn make_service(urls: &[&str]) -> Service {
        Service::new("test", &ServiceConfig::with_instances(urls.iter().copied()))
    }

    fn pick(svc: &Service) -> String {
        svc.select_instance().unwrap().address.clone()
    }

    #[test]
    fn test_round_robin_single() {
        let svc = make_service(&["http://127.0.0.1:8001"]);
        assert_eq!(pick(&svc), "http://127.0.0.1:8001");
        assert_eq!(pick(&svc), "http://127.0.0.1:8001");
    }

    #[test]
    fn test_round_robin_cycles() {
        let svc = make_service(&["http://a:8001", "http://b:8002", "http://c:8003"]);
        let urls: Vec<String> = (0..6).map(|_| pick(&svc)).collect();
        assert_eq!(
            urls,
            vec![
                "http://a:8001",
                "http://b:8002",
                "http://c:8003",
                "http://a:8001",
                "http://b:8002",
                "http://c:8003",
            ]
        );
    }

    #[test]
    fn test_round_robin_fairness() {
        for n in [1usize, 7, 30, 31, 100] {
            let svc = make_service(&["http://a", "http://b", "http://c"]);
            let mut counts: HashMap<String, usize> = HashMap::new();
            for _ in 0..n {
                *counts.entry(pick(&svc)).or_insert(0) += 1;
            }
            let k = svc.total_count();
            for addr in ["http://a", "http://b", "http://c"] {
                let c = counts.get(addr).copied().unwrap_or(0);
                assert!(c == n / k || c == n.div_ceil(k), "n={} addr={} c={}", n, addr, c);
            }
        }
    }

    #[test]
    fn test_skips_unhealthy() {
        let svc = make_service(&["http://a:8001", "http://b:8002"]);
        svc.apply_health(&[false, true]);
        for _ in 0..4 {
            assert_eq!(pick(&svc), "http://b:8002");
        }
    }

    #[test]
    fn test_all_unhealthy_returns_none() {
        let svc = make_service(&["http://a:8001", "http://b:8002"]);
        svc.apply_health(&[false, false]);
        assert!(svc.select_instance().is_none());
        assert_eq!(svc.healthy_count(), 0);
    }

    #[test]
    fn test_recovery_restores_rotation() {
        let svc = make_service(&["http://a", "http://b"]);
        svc.apply_health(&[true, false]);
        assert_eq!(pick(&svc), "http://a");
        assert_eq!(pick(&svc), "http://a");

        svc.apply_health(&[true, true]);
        let urls: Vec<String> = (0..4).map(|_| pick(&svc)).collect();
        assert_eq!(urls.iter().filter(|u| *u == "http://a").count(), 2);
        assert_eq!(urls.iter().filter(|u| *u == "http://b").count(), 2);
    }

    #[test]
    fn test_apply_health_reports_changes() {
        let svc = make_service(&["http://a", "http://b"]);
        let changed = svc.apply_health(&[true, false]);
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].0.address, "http://b");
        assert!(!changed[0].1);
        assert!(!svc.instances()[1].is_healthy());

        // Same result again: nothing changed
        assert!(svc.apply_health(&[true, false]).is_empty());

        let changed = svc.apply_health(&[true, true]);
        assert_eq!(changed.len(), 1);
        assert!(changed[0].1);
    }

    #[test]
    fn test_short_results_mark_missing_unhealthy() {
        let svc = make_service(&["http://a", "http://b"]);
        svc.apply_health(&[true]);
        assert_eq!(svc.healthy_count(), 1);
    }

    #[test]
    fn test_snapshot_held_across_update() {
        let svc = make_service(&["http://a", "http://b"]);
        let before = svc.healthy_snapshot();
        svc.apply_health(&[false, false]);
        assert_eq!(before.len(), 2);
        assert_eq!(svc.healthy_snapshot().len(), 0);
    }

    #[test]
    fn test_health_ratio() {
        let svc = make_service(&["http://a", "http://b", "http://c", "http://d"]);
        assert_eq!(svc.health_ratio(), 1.0);
        svc.apply_health(&[true, false, true, false]);
        assert_eq!(svc.health_ratio(), 0.5);
        assert_eq!(svc.total_count(), 4);
    }

    #[test]
    fn test_empty_service() {
        let svc = make_service(&[]);
        assert!(svc.select_instance().is_none());
        assert_eq!(svc.health_ratio(), 0.0);
    }
}
