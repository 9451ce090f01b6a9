//! Control-plane configuration.
//!
//! Every timeout has a bounded default so no operation can hang without
//! surfacing a phase change or a typed error.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::retry::BackoffPolicy;

/// Configuration for the control daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Admin API bind address.
    pub bind_addr: SocketAddr,
    /// Raw byte budget for the storage substrate.
    pub storage_capacity_bytes: u64,
    /// Node inventory for metadata instance placement.
    pub placement_nodes: Vec<u64>,
    /// Port advertised in published export endpoints.
    pub export_port: u16,
    /// Seconds without a heartbeat before an instance goes Unhealthy.
    pub health_window_secs: u64,
    /// Delay between passes while waiting on instance health, in milliseconds.
    pub health_poll_ms: u64,
    /// Seconds between supervision sweeps.
    pub supervision_interval_secs: u64,
    /// Seconds between full reconcile sweeps.
    pub reconcile_interval_secs: u64,
    /// Grace period for metadata drain before DrainTimeout, in milliseconds.
    pub drain_grace_ms: u64,
    /// Seconds a tombstone is retained for audit.
    pub tombstone_retention_secs: u64,
    /// Buffer capacity of the transition event bus.
    pub event_buffer: usize,
    /// Backoff for transient provisioning failures.
    pub pool_backoff: BackoffPolicy,
    /// Bearer token required by the admin API, if set.
    pub admin_token: Option<String>,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8780)),
            storage_capacity_bytes: 1 << 40,
            placement_nodes: vec![1, 2, 3],
            export_port: 2049,
            health_window_secs: 15,
            health_poll_ms: 500,
            supervision_interval_secs: 5,
            reconcile_interval_secs: 2,
            drain_grace_ms: 30_000,
            tombstone_retention_secs: 3600,
            event_buffer: 256,
            pool_backoff: BackoffPolicy::default(),
            admin_token: None,
        }
    }
}

impl ControlConfig {
    /// Load a configuration from a `.toml` or `.json` file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        match ext.to_lowercase().as_str() {
            "toml" => {
                let config: ControlConfig = toml::from_str(&contents)?;
                Ok(config)
            }
            "json" => {
                let config: ControlConfig = serde_json::from_str(&contents)?;
                Ok(config)
            }
            _ => anyhow::bail!("Unsupported config file extension: {}", ext),
        }
    }

    /// Scheduler knobs derived from this configuration.
    pub fn sched_config(&self) -> fsorch_sched::SchedConfig {
        fsorch_sched::SchedConfig {
            health_window_secs: self.health_window_secs,
            drain_grace: Duration::from_millis(self.drain_grace_ms),
        }
    }

    /// Delay between passes while waiting on instance health.
    pub fn health_poll(&self) -> Duration {
        Duration::from_millis(self.health_poll_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_values_bounded() {
        let config = ControlConfig::default();
        assert_eq!(config.bind_addr, SocketAddr::from(([0, 0, 0, 0], 8780)));
        assert!(config.health_window_secs > 0);
        assert!(config.drain_grace_ms > 0);
        assert!(config.tombstone_retention_secs > 0);
        assert!(config.pool_backoff.max_attempts > 0);
        assert!(config.admin_token.is_none());
    }

    #[test]
    fn test_serialization_round_trip() {
        let config = ControlConfig {
            placement_nodes: vec![10, 20],
            admin_token: Some("secret".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let decoded: ControlConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.placement_nodes, vec![10, 20]);
        assert_eq!(decoded.admin_token.as_deref(), Some("secret"));
    }

    #[test]
    fn test_from_toml_file() {
        let config = ControlConfig {
            health_window_secs: 7,
            ..Default::default()
        };
        let toml_text = toml::to_string(&config).unwrap();
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        file.write_all(toml_text.as_bytes()).unwrap();

        let loaded = ControlConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded.health_window_secs, 7);
    }

    #[test]
    fn test_from_json_file() {
        let config = ControlConfig::default();
        let json_text = serde_json::to_string(&config).unwrap();
        let mut file = NamedTempFile::with_suffix(".json").unwrap();
        file.write_all(json_text.as_bytes()).unwrap();

        let loaded = ControlConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded.export_port, 2049);
    }

    #[test]
    fn test_unsupported_extension() {
        let mut file = NamedTempFile::with_suffix(".yaml").unwrap();
        file.write_all(b"bind_addr: 1").unwrap();
        assert!(ControlConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn test_sched_config_mapping() {
        let config = ControlConfig {
            health_window_secs: 9,
            drain_grace_ms: 1234,
            ..Default::default()
        };
        let sched = config.sched_config();
        assert_eq!(sched.health_window_secs, 9);
        assert_eq!(sched.drain_grace, Duration::from_millis(1234));
    }
}
