// src/server/tracker.rs

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Counts in-flight proxy sessions so shutdown can wait for drain. Each
/// session holds a guard for its whole lifetime; the guard decrements on
/// drop, on every exit path.
#[derive(Clone, Default)]
pub struct SessionTracker {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    active: AtomicUsize,
    idle: Notify,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn guard(&self) -> SessionGuard {
        self.inner.active.fetch_add(1, Ordering::AcqRel);
        SessionGuard {
            inner: self.inner.clone(),
        }
    }

    pub fn active(&self) -> usize {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Resolve once no sessions are in flight. Registers for notification
    /// before re-checking the count, so a decrement between the check and
    /// the await cannot be missed.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.inner.active.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

pub struct SessionGuard {
    inner: Arc<Inner>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.inner.active.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}
