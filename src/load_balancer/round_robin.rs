// src/load_balancer/round_robin.rs

use crate::proxy::{ServerPool, Upstream};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("no healthy upstream available")]
pub struct NoHealthyUpstream;

/// Round-robin selection over a server pool, skipping unhealthy members.
///
/// The cursor is the index of the last claimed position, -1 before the
/// first selection. Each advance is claimed with a compare-and-swap, so
/// concurrent callers never treat the same raw position as theirs; a lost
/// swap retries without consuming a scan step.
pub struct RoundRobin {
    cursor: AtomicI64,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self {
            cursor: AtomicI64::new(-1),
        }
    }

    /// Last claimed cursor position (-1 before the first selection).
    pub fn cursor(&self) -> i64 {
        self.cursor.load(Ordering::Acquire)
    }

    /// Advance through the pool until a healthy upstream is claimed. After
    /// one full cycle with no healthy member, fail; the cursor has then
    /// advanced exactly `pool.len()` steps, landing back where it started.
    pub fn next_healthy(&self, pool: &ServerPool) -> Result<Arc<Upstream>, NoHealthyUpstream> {
        let len = pool.len() as i64;
        let mut scanned = 0;

        while scanned < len {
            let current = self.cursor.load(Ordering::Acquire);
            let next = (current + 1) % len;

            if self
                .cursor
                .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                // Another caller claimed this position; retry.
                continue;
            }
            scanned += 1;

            let upstream = &pool.servers()[next as usize];
            if upstream.is_healthy() {
                return Ok(upstream.clone());
            }
        }

        Err(NoHealthyUpstream)
    }
}

impl Default for RoundRobin {
    fn default() -> Self {
        Self::new()
    }
}
