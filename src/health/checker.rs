// src/health/checker.rs

use crate::config::HealthCheckConfig;
use crate::proxy::{ServerPool, Upstream};
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};
use url::Url;

/// Outcome of a single probe, used for the per-tick summary.
#[derive(Debug)]
pub struct ProbeOutcome {
    pub address: String,
    pub healthy: bool,
    pub detail: Option<String>,
}

/// Periodic health prober. Every tick it issues one HTTP GET per pool
/// member against the probe path; exactly a 200 marks the member healthy,
/// anything else (including transport failure or timeout) marks it
/// unhealthy. Probes run concurrently with each other, bounded by a
/// semaphore, and a previously failed server is re-admitted after a single
/// later success.
pub struct HealthChecker {
    config: HealthCheckConfig,
    pool: Arc<ServerPool>,
    client: Client,
    permits: Arc<Semaphore>,
    shutdown_rx: watch::Receiver<bool>,
}

impl HealthChecker {
    pub fn new(
        config: HealthCheckConfig,
        pool: Arc<ServerPool>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        let permits = Arc::new(Semaphore::new(config.probe_concurrency()));

        Ok(Self {
            config,
            pool,
            client,
            permits,
            shutdown_rx,
        })
    }

    /// Tick until shutdown is signalled. Probes already in flight when the
    /// signal arrives finish on their own tasks and never block shutdown.
    pub async fn run(self) {
        let period = self.config.interval();
        // Ticker semantics: the first probe fires one full interval after
        // start, so a freshly started balancer serves before any probe.
        let mut ticker = interval_at(Instant::now() + period, period);
        let mut shutdown_rx = self.shutdown_rx.clone();

        info!(interval = ?period, "health checker started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = async { shutdown_rx.wait_for(|stop| *stop).await.map(|_| ()) } => {
                    info!("health checker stopped");
                    break;
                }
            }
        }
    }

    /// Probe every pool member once, with bounded fan-out.
    pub async fn check_all(&self) {
        let mut probes = Vec::with_capacity(self.pool.len());

        for upstream in self.pool.servers() {
            let permit = match self.permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            let client = self.client.clone();
            let path = self.config.path.clone();
            let upstream = upstream.clone();

            probes.push(tokio::spawn(async move {
                let outcome = probe(&client, &path, &upstream).await;
                drop(permit);
                outcome
            }));
        }

        let mut healthy = 0;
        let mut unhealthy = 0;
        for result in futures::future::join_all(probes).await {
            match result {
                Ok(outcome) if outcome.healthy => healthy += 1,
                Ok(_) => unhealthy += 1,
                Err(e) => {
                    warn!(error = %e, "health probe task panicked");
                    unhealthy += 1;
                }
            }
        }

        debug!(healthy, unhealthy, "health check tick complete");
    }
}

async fn probe(client: &Client, path: &str, upstream: &Upstream) -> ProbeOutcome {
    let was_healthy = upstream.is_healthy();

    let (healthy, detail) = match Url::parse(&format!("http://{}{}", upstream.address, path)) {
        Ok(url) => match client.get(url).send().await {
            Ok(response) if response.status() == StatusCode::OK => (true, None),
            Ok(response) => (false, Some(format!("HTTP {}", response.status()))),
            Err(e) => (false, Some(e.to_string())),
        },
        Err(e) => (false, Some(format!("bad probe URL: {e}"))),
    };

    upstream.record_probe(healthy).await;

    if healthy && !was_healthy {
        info!(upstream = %upstream.address, "upstream is healthy again");
    } else if !healthy && was_healthy {
        warn!(
            upstream = %upstream.address,
            detail = detail.as_deref().unwrap_or("unknown"),
            "upstream marked unhealthy"
        );
    }

    ProbeOutcome {
        address: upstream.address.clone(),
        healthy,
        detail,
    }
}
