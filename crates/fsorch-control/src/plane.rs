//! Control-plane assembly and client-facing operations.

use std::sync::Arc;
use std::time::Duration;

use fsorch_export::ExportCoordinator;
use fsorch_pool::{PoolManager, StorageSubstrate};
use fsorch_sched::{MetadataScheduler, PlacementSubstrate};

use crate::config::ControlConfig;
use crate::error::ControlError;
use crate::events::EventBus;
use crate::reconciler::{ReconcileOutcome, Reconciler};
use crate::store::FilesystemStore;
use crate::types::{FilesystemPhase, FilesystemRecord, FilesystemSpec, Tombstone};

/// Upper bound on passes a single settle call will drive.
const MAX_SETTLE_PASSES: u32 = 32;

/// The assembled control plane: store, reconciler and collaborator handles.
pub struct ControlPlane {
    config: ControlConfig,
    store: Arc<FilesystemStore>,
    pools: Arc<PoolManager>,
    scheduler: Arc<MetadataScheduler>,
    exports: Arc<ExportCoordinator>,
    events: Arc<EventBus>,
    reconciler: Arc<Reconciler>,
}

impl ControlPlane {
    /// Wire the control plane over the injected substrates.
    pub fn new(
        config: ControlConfig,
        storage: Arc<dyn StorageSubstrate>,
        placement: Arc<dyn PlacementSubstrate>,
    ) -> Self {
        let store = Arc::new(FilesystemStore::new());
        let pools = Arc::new(PoolManager::new(storage));
        let scheduler = Arc::new(MetadataScheduler::new(config.sched_config(), placement));
        let exports = Arc::new(ExportCoordinator::new());
        let events = Arc::new(EventBus::new(config.event_buffer));
        let reconciler = Arc::new(Reconciler::new(
            config.clone(),
            store.clone(),
            pools.clone(),
            scheduler.clone(),
            exports.clone(),
            events.clone(),
        ));
        Self {
            config,
            store,
            pools,
            scheduler,
            exports,
            events,
            reconciler,
        }
    }

    /// Effective configuration.
    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    /// The spec/status store.
    pub fn store(&self) -> &Arc<FilesystemStore> {
        &self.store
    }

    /// The pool manager.
    pub fn pools(&self) -> &Arc<PoolManager> {
        &self.pools
    }

    /// The metadata scheduler.
    pub fn scheduler(&self) -> &Arc<MetadataScheduler> {
        &self.scheduler
    }

    /// The export coordinator.
    pub fn exports(&self) -> &Arc<ExportCoordinator> {
        &self.exports
    }

    /// The transition event bus.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// The reconciler.
    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    /// Admit a filesystem request.
    pub async fn create_filesystem(
        &self,
        spec: FilesystemSpec,
    ) -> Result<FilesystemRecord, ControlError> {
        self.store.create(spec).await
    }

    /// Look a filesystem up by name.
    pub async fn get_filesystem(&self, name: &str) -> Result<FilesystemRecord, ControlError> {
        self.store
            .get(name)
            .await
            .ok_or_else(|| ControlError::NotFound {
                name: name.to_string(),
            })
    }

    /// All filesystems, sorted by name.
    pub async fn list_filesystems(&self) -> Vec<FilesystemRecord> {
        self.store.list().await
    }

    /// Retained tombstones.
    pub async fn list_tombstones(&self) -> Vec<Tombstone> {
        self.store.tombstones().await
    }

    /// Request teardown. Rejected while mounts are outstanding.
    pub async fn delete_filesystem(&self, name: &str) -> Result<(), ControlError> {
        self.get_filesystem(name).await?;
        let mounts = self.exports.mount_count(name);
        if mounts > 0 {
            return Err(ControlError::FilesystemInUse {
                name: name.to_string(),
                mounts,
            });
        }
        self.store.request_delete(name).await?;
        Ok(())
    }

    /// Change the desired metadata replica count.
    pub async fn scale_replicas(&self, name: &str, replicas: u32) -> Result<u64, ControlError> {
        self.store.scale_replicas(name, replicas).await
    }

    /// Operator escalation after a DrainTimeout: discard stuck instances
    /// and resume teardown.
    pub async fn force_delete(&self, name: &str) -> Result<(), ControlError> {
        self.get_filesystem(name).await?;
        let killed = self.scheduler.force_unschedule(name).await;
        tracing::warn!(filesystem = %name, killed, "force-killed metadata instances");
        match self.reconciler.reconcile(name).await {
            Ok(_) | Err(ControlError::NotFound { .. }) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Run one reconciliation pass.
    pub async fn reconcile(&self, name: &str) -> Result<ReconcileOutcome, ControlError> {
        self.reconciler.reconcile(name).await
    }

    /// Drive one filesystem until it stops making progress, honoring
    /// requeue delays. Returns the phase it settled in.
    pub async fn reconcile_to_settled(
        &self,
        name: &str,
    ) -> Result<FilesystemPhase, ControlError> {
        for _ in 0..MAX_SETTLE_PASSES {
            let outcome = match self.reconciler.reconcile(name).await {
                Ok(outcome) => outcome,
                // entombed mid-loop
                Err(ControlError::NotFound { .. }) => return Ok(FilesystemPhase::Deleted),
                Err(err) => return Err(err),
            };
            if let Some((_, to)) = outcome.transition {
                if to.is_terminal() {
                    return Ok(to);
                }
                continue;
            }
            match outcome.requeue_after {
                Some(delay) => tokio::time::sleep(delay.min(Duration::from_millis(200))).await,
                None => break,
            }
        }
        match self.store.get(name).await {
            Some(record) => Ok(record.status.phase),
            None => Ok(FilesystemPhase::Deleted),
        }
    }
}
