// src/server/balancer.rs

use super::tracker::SessionTracker;
use crate::config::Config;
use crate::health::HealthChecker;
use crate::load_balancer::RoundRobin;
use crate::proxy::{ProxySession, ServerPool};
use anyhow::{anyhow, Result};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum ShutdownError {
    #[error("shutdown drain timed out with {active} session(s) still open")]
    DrainTimeout { active: usize },
}

/// Owns the listening socket, the accept loop, and shutdown coordination.
///
/// Lifecycle has exactly two phases: running (accepting, health checks
/// active) and shutting down (listener closed, checks stopped, waiting for
/// in-flight sessions to drain). The transition is one-way and idempotent.
pub struct Balancer {
    pool: Arc<ServerPool>,
    router: Arc<RoundRobin>,
    listener: Mutex<Option<TcpListener>>,
    checker: Mutex<Option<HealthChecker>>,
    local_addr: SocketAddr,
    tracker: SessionTracker,
    session_deadline: Duration,
    shutting_down: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    abort_tx: watch::Sender<bool>,
}

impl Balancer {
    /// Validate the configuration, build the pool, and bind the listener.
    /// Any failure here is fatal to startup.
    pub async fn bind(config: Config) -> Result<Self> {
        config.validate()?;
        let pool = Arc::new(ServerPool::new(config.listen_port, &config.upstream_ports)?);

        let listener = TcpListener::bind(config.listen_addr()).await?;
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (abort_tx, _) = watch::channel(false);

        let checker = HealthChecker::new(config.health_check.clone(), pool.clone(), shutdown_rx)?;

        info!(
            listen = %local_addr,
            upstreams = pool.len(),
            "balancer bound"
        );

        Ok(Self {
            pool,
            router: Arc::new(RoundRobin::new()),
            listener: Mutex::new(Some(listener)),
            checker: Mutex::new(Some(checker)),
            local_addr,
            tracker: SessionTracker::new(),
            session_deadline: config.session.deadline(),
            shutting_down: AtomicBool::new(false),
            shutdown_tx,
            abort_tx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn pool(&self) -> &Arc<ServerPool> {
        &self.pool
    }

    pub fn active_sessions(&self) -> usize {
        self.tracker.active()
    }

    /// Run the health checker and the accept loop until shutdown. Each
    /// accepted connection becomes its own tracked session task; accept
    /// errors while running are logged and the loop keeps accepting, while
    /// the shutdown-path exit is silent.
    pub async fn serve(&self) -> Result<()> {
        let listener = self
            .listener
            .lock()
            .await
            .take()
            .ok_or_else(|| anyhow!("serve may only be called once"))?;

        if let Some(checker) = self.checker.lock().await.take() {
            tokio::spawn(checker.run());
        }

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        info!("accepting connections on {}", self.local_addr);

        loop {
            tokio::select! {
                res = listener.accept() => match res {
                    Ok((stream, peer)) => self.spawn_session(stream, peer),
                    Err(e) => {
                        if self.shutting_down.load(Ordering::Acquire) {
                            break;
                        }
                        error!(error = %e, "failed to accept connection");
                    }
                },
                _ = shutdown_rx.wait_for(|stop| *stop) => break,
            }
        }

        // Dropping the listener closes it; no further accepts.
        drop(listener);
        info!("listener closed");
        Ok(())
    }

    fn spawn_session(&self, stream: TcpStream, peer: SocketAddr) {
        let guard = self.tracker.guard();
        let router = self.router.clone();
        let pool = self.pool.clone();
        let session = ProxySession::new(stream, peer, self.session_deadline, self.abort_tx.subscribe());
        let id = session.id();

        debug!(session = %id, %peer, "connection accepted");

        tokio::spawn(async move {
            let _guard = guard;
            match session.run(&router, &pool).await {
                Ok(end) => debug!(session = %id, ?end, "session closed"),
                // Routing or dial failure ends only this session; the
                // client reconnects for a fresh routing decision.
                Err(e) => warn!(session = %id, %peer, error = %e, "session failed"),
            }
        });
    }

    /// Request graceful shutdown: stop accepting, stop scheduling health
    /// probes, then wait up to `drain_timeout` for in-flight sessions to
    /// finish. Safe to call more than once; only the first call does any
    /// work, later calls return Ok immediately.
    pub async fn shutdown(&self, drain_timeout: Duration) -> Result<(), ShutdownError> {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        info!("shutdown requested, draining sessions");
        let _ = self.shutdown_tx.send(true);

        match timeout(drain_timeout, self.tracker.wait_idle()).await {
            Ok(()) => {
                info!("all sessions drained");
                Ok(())
            }
            Err(_) => {
                let active = self.tracker.active();
                warn!(active, "drain timed out");
                Err(ShutdownError::DrainTimeout { active })
            }
        }
    }

    /// Forcibly end still-open sessions. Deliberately separate from
    /// `shutdown`: whether to cut in-flight connections after a drain
    /// timeout is the caller's policy.
    pub fn abort_sessions(&self) {
        warn!(active = self.tracker.active(), "aborting in-flight sessions");
        let _ = self.abort_tx.send(true);
    }
}
