//! Explicit test fixtures for lifecycle scenarios.
//!
//! Every scenario builds its own fixture; nothing is process-global. Timing
//! knobs are shrunk so retries and health polls settle in milliseconds.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use fsorch_control::{
    BackoffPolicy, ControlConfig, ControlPlane, FilesystemPhase, FilesystemSpec,
};
use fsorch_pool::{InMemorySubstrate, ReplicationPolicy, StorageSubstrate};
use fsorch_sched::{NodeId, PlacementSubstrate, RoundRobinPlacement};

/// Knobs for building a fixture.
#[derive(Debug, Clone)]
pub struct FixtureConfig {
    /// Raw byte budget for the storage substrate.
    pub storage_capacity_bytes: u64,
    /// Placement node inventory.
    pub nodes: Vec<u64>,
    /// Transient failures tolerated before Failed.
    pub max_attempts: u32,
    /// Drain grace period in milliseconds.
    pub drain_grace_ms: u64,
}

impl Default for FixtureConfig {
    fn default() -> Self {
        Self {
            storage_capacity_bytes: 1 << 40,
            nodes: vec![1, 2, 3],
            max_attempts: 5,
            drain_grace_ms: 200,
        }
    }
}

/// Everything a scenario needs, built fresh per test.
pub struct Fixture {
    /// The assembled control plane under test.
    pub plane: Arc<ControlPlane>,
}

/// Build a fixture with default substrates.
pub fn fixture() -> Fixture {
    fixture_with(FixtureConfig::default(), None)
}

/// Build a fixture, optionally swapping either substrate.
pub fn fixture_with(
    config: FixtureConfig,
    storage: Option<Arc<dyn StorageSubstrate>>,
) -> Fixture {
    fixture_full(config, storage, None)
}

/// Build a fixture with full substrate control.
pub fn fixture_full(
    config: FixtureConfig,
    storage: Option<Arc<dyn StorageSubstrate>>,
    placement: Option<Arc<dyn PlacementSubstrate>>,
) -> Fixture {
    let control_config = ControlConfig {
        health_poll_ms: 5,
        drain_grace_ms: config.drain_grace_ms,
        pool_backoff: BackoffPolicy {
            initial_ms: 1,
            multiplier: 2.0,
            max_ms: 20,
            max_attempts: config.max_attempts,
        },
        ..Default::default()
    };
    let storage =
        storage.unwrap_or_else(|| Arc::new(InMemorySubstrate::new(config.storage_capacity_bytes)));
    let placement = placement.unwrap_or_else(|| {
        Arc::new(RoundRobinPlacement::new(
            config.nodes.iter().map(|n| NodeId::new(*n)).collect(),
        ))
    });
    Fixture {
        plane: Arc::new(ControlPlane::new(control_config, storage, placement)),
    }
}

/// Spec matching the standard smoke filesystem.
pub fn smoke_spec(name: &str) -> FilesystemSpec {
    FilesystemSpec {
        name: name.to_string(),
        data_replication: ReplicationPolicy::Replicated { count: 1 },
        metadata_replication: ReplicationPolicy::Replicated { count: 1 },
        metadata_replicas: 1,
        capacity_bytes: 1 << 30,
    }
}

/// Current wall clock in seconds since epoch.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl Fixture {
    /// Heartbeat every scheduled instance of a filesystem.
    pub async fn heartbeat_all(&self, name: &str) {
        for inst in self.plane.scheduler().instances(name).await {
            let _ = self
                .plane
                .scheduler()
                .record_heartbeat(name, inst.id, now_secs())
                .await;
        }
    }

    /// Drive a created filesystem to `Active`, heartbeating as soon as
    /// instances are scheduled.
    pub async fn activate(&self, name: &str) -> FilesystemPhase {
        for _ in 0..8 {
            if self.phase(name).await == Some(FilesystemPhase::Active) {
                return FilesystemPhase::Active;
            }
            let _ = self.plane.reconcile(name).await;
            self.heartbeat_all(name).await;
        }
        self.phase(name).await.unwrap_or(FilesystemPhase::Failed)
    }

    /// Create the smoke spec and drive it to `Active`.
    pub async fn create_and_activate(&self, name: &str) -> FilesystemPhase {
        self.plane
            .create_filesystem(smoke_spec(name))
            .await
            .expect("create failed");
        self.activate(name).await
    }

    /// Current phase; `Deleted` when only the tombstone remains.
    pub async fn phase(&self, name: &str) -> Option<FilesystemPhase> {
        if let Some(record) = self.plane.store().get(name).await {
            return Some(record.status.phase);
        }
        if self.plane.store().tombstone(name).await.is_some() {
            return Some(FilesystemPhase::Deleted);
        }
        None
    }
}
