// src/proxy/upstream.rs

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// One backend server. The address is fixed for the lifetime of the pool;
/// only the health flag is ever mutated, and only by the health checker.
#[derive(Debug)]
pub struct Upstream {
    pub address: String,
    healthy: AtomicBool,
    last_probe: RwLock<Option<DateTime<Utc>>>,
}

impl Upstream {
    pub fn new(address: String) -> Self {
        Self {
            address,
            // Servers start healthy so the balancer can route before the
            // first probe cycle completes.
            healthy: AtomicBool::new(true),
            last_probe: RwLock::new(None),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Release);
    }

    /// Record a probe outcome: update the health flag and the probe timestamp.
    pub async fn record_probe(&self, healthy: bool) {
        self.set_healthy(healthy);
        let mut last_probe = self.last_probe.write().await;
        *last_probe = Some(Utc::now());
    }

    pub async fn last_probe(&self) -> Option<DateTime<Utc>> {
        *self.last_probe.read().await
    }
}
