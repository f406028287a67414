// src/proxy/pool.rs

use super::upstream::Upstream;
use crate::config::ConfigError;
use std::sync::Arc;

/// Ordered, immutable set of upstream servers. The order is fixed at
/// construction and defines the round-robin sequence.
pub struct ServerPool {
    servers: Vec<Arc<Upstream>>,
}

impl ServerPool {
    /// Build the pool from configured upstream ports. Fails if the pool
    /// would be empty, a port is 0, or a port collides with the balancer's
    /// own listen port. All upstreams are local (`127.0.0.1:<port>`).
    pub fn new(listen_port: u16, upstream_ports: &[u16]) -> Result<Self, ConfigError> {
        if upstream_ports.is_empty() {
            return Err(ConfigError::NoUpstreams);
        }

        let mut servers = Vec::with_capacity(upstream_ports.len());
        for &port in upstream_ports {
            if port == 0 {
                return Err(ConfigError::InvalidPort(port));
            }
            if port == listen_port {
                return Err(ConfigError::PortCollision(port));
            }
            servers.push(Arc::new(Upstream::new(format!("127.0.0.1:{port}"))));
        }

        Ok(Self { servers })
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn servers(&self) -> &[Arc<Upstream>] {
        &self.servers
    }

    pub fn get(&self, index: usize) -> Option<&Arc<Upstream>> {
        self.servers.get(index)
    }

    pub fn addresses(&self) -> Vec<&str> {
        self.servers.iter().map(|s| s.address.as_str()).collect()
    }

    /// Idempotent; safe against concurrent readers. Out-of-range indexes
    /// are ignored.
    pub fn set_healthy(&self, index: usize, healthy: bool) {
        if let Some(server) = self.servers.get(index) {
            server.set_healthy(healthy);
        }
    }

    pub fn is_healthy(&self, index: usize) -> bool {
        self.servers
            .get(index)
            .map(|s| s.is_healthy())
            .unwrap_or(false)
    }

    pub fn healthy_count(&self) -> usize {
        self.servers.iter().filter(|s| s.is_healthy()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_pool_is_rejected() {
        assert!(matches!(
            ServerPool::new(7070, &[]),
            Err(ConfigError::NoUpstreams)
        ));
    }

    #[test]
    fn zero_port_is_rejected() {
        assert!(matches!(
            ServerPool::new(7070, &[9001, 0]),
            Err(ConfigError::InvalidPort(0))
        ));
    }

    #[test]
    fn collision_with_listen_port_is_rejected() {
        assert!(matches!(
            ServerPool::new(7070, &[9001, 7070]),
            Err(ConfigError::PortCollision(7070))
        ));
    }

    #[test]
    fn addresses_keep_configured_order() {
        let pool = ServerPool::new(7070, &[9003, 9001, 9002]).unwrap();
        assert_eq!(
            pool.addresses(),
            vec!["127.0.0.1:9003", "127.0.0.1:9001", "127.0.0.1:9002"]
        );
        assert_eq!(pool.healthy_count(), 3);
    }

    #[test]
    fn set_healthy_is_idempotent() {
        let pool = ServerPool::new(7070, &[9001]).unwrap();
        pool.set_healthy(0, false);
        pool.set_healthy(0, false);
        assert!(!pool.is_healthy(0));
        pool.set_healthy(0, true);
        assert!(pool.is_healthy(0));
    }
}
