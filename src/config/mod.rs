// src/config/mod.rs

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML config: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("failed to parse JSON config: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("no upstream servers configured")]
    NoUpstreams,

    #[error("invalid upstream port: {0}")]
    InvalidPort(u16),

    #[error("upstream port {0} collides with the balancer's listen port")]
    PortCollision(u16),

    #[error("health probe interval must be at least one second")]
    ZeroProbeInterval,

    #[error("health probe timeout ({timeout_secs}s) exceeds the probe interval ({interval_secs}s)")]
    ProbeTimeoutTooLong { timeout_secs: u64, interval_secs: u64 },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub listen_port: u16,
    pub upstream_ports: Vec<u16>,
    #[serde(default)]
    pub health_check: HealthCheckConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthCheckConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_probe_path")]
    pub path: String,
    /// 0 means "use available parallelism".
    #[serde(default)]
    pub max_concurrent_probes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShutdownConfig {
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
    #[serde(default = "default_abort_on_drain_timeout")]
    pub abort_on_drain_timeout: bool,
}

fn default_interval_secs() -> u64 {
    5
}

fn default_timeout_secs() -> u64 {
    2
}

fn default_probe_path() -> String {
    "/healthcheck".to_string()
}

fn default_deadline_secs() -> u64 {
    600
}

fn default_drain_timeout_secs() -> u64 {
    10
}

fn default_abort_on_drain_timeout() -> bool {
    true
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            timeout_secs: default_timeout_secs(),
            path: default_probe_path(),
            max_concurrent_probes: 0,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            deadline_secs: default_deadline_secs(),
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout_secs: default_drain_timeout_secs(),
            abort_on_drain_timeout: default_abort_on_drain_timeout(),
        }
    }
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Upper bound on probes in flight at once during a single tick.
    pub fn probe_concurrency(&self) -> usize {
        if self.max_concurrent_probes > 0 {
            self.max_concurrent_probes
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        }
    }
}

impl SessionConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

impl ShutdownConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

impl Config {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.listen_port))
    }

    /// Timing sanity checks. Upstream port validation happens when the
    /// server pool is constructed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.health_check.interval_secs == 0 {
            return Err(ConfigError::ZeroProbeInterval);
        }
        if self.health_check.timeout_secs > self.health_check.interval_secs {
            return Err(ConfigError::ProbeTimeoutTooLong {
                timeout_secs: self.health_check.timeout_secs,
                interval_secs: self.health_check.interval_secs,
            });
        }
        Ok(())
    }
}

/// Load configuration from a file (YAML or JSON, decided by extension).
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let contents = tokio::fs::read_to_string(path).await?;

    let ext = path.extension().and_then(|s| s.to_str());
    let config: Config = if ext == Some("yaml") || ext == Some("yml") {
        serde_yaml::from_str(&contents)?
    } else {
        serde_json::from_str(&contents)?
    };

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_in_missing_sections() {
        let config: Config =
            serde_yaml::from_str("listen_port: 7070\nupstream_ports: [9001, 9002]\n").unwrap();

        assert_eq!(config.health_check.interval_secs, 5);
        assert_eq!(config.health_check.path, "/healthcheck");
        assert_eq!(config.session.deadline_secs, 600);
        assert!(config.shutdown.abort_on_drain_timeout);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn probe_timeout_longer_than_interval_is_rejected() {
        let config: Config = serde_yaml::from_str(
            "listen_port: 7070\nupstream_ports: [9001]\nhealth_check:\n  interval_secs: 2\n  timeout_secs: 5\n",
        )
        .unwrap();

        assert!(matches!(
            config.validate(),
            Err(ConfigError::ProbeTimeoutTooLong { .. })
        ));
    }

    #[test]
    fn zero_probe_interval_is_rejected() {
        let config: Config = serde_yaml::from_str(
            "listen_port: 7070\nupstream_ports: [9001]\nhealth_check:\n  interval_secs: 0\n  timeout_secs: 0\n",
        )
        .unwrap();

        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroProbeInterval)
        ));
    }
}
