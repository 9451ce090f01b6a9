//! The filesystem lifecycle state machine.
//!
//! One reconciliation pass inspects desired vs. observed state for a single
//! filesystem and issues only the missing actions, so a pass is idempotent
//! and safe to re-run after a crash. Passes for different filesystems run in
//! parallel; passes for the same filesystem serialize on a per-filesystem
//! lock. The spec generation captured at entry guards the status writeback
//! against superseded passes.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use fsorch_export::{EndpointInfo, ExportCoordinator};
use fsorch_pool::{PoolError, PoolId, PoolKind, PoolManager, PoolSpec};
use fsorch_sched::{MetadataScheduler, SchedError};

use crate::config::ControlConfig;
use crate::error::ControlError;
use crate::events::{EventBus, TransitionEvent};
use crate::store::FilesystemStore;
use crate::types::{
    now_secs, FilesystemPhase, FilesystemRecord, FilesystemSpec, FilesystemStatus,
};

/// Metadata pools are sized at 1% of data capacity, floored at 1 MiB.
const METADATA_POOL_DIVISOR: u64 = 100;
const METADATA_POOL_FLOOR_BYTES: u64 = 1 << 20;

/// Result of one reconciliation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    /// Transition applied by this pass, if any.
    pub transition: Option<(FilesystemPhase, FilesystemPhase)>,
    /// When the caller should run the next pass, if a retry is pending.
    pub requeue_after: Option<Duration>,
}

struct StepResult {
    status: FilesystemStatus,
    transition: Option<(FilesystemPhase, FilesystemPhase, String)>,
    requeue_after: Option<Duration>,
}

impl StepResult {
    fn settled(status: FilesystemStatus) -> Self {
        Self {
            status,
            transition: None,
            requeue_after: None,
        }
    }

    fn requeue(status: FilesystemStatus, after: Duration) -> Self {
        Self {
            status,
            transition: None,
            requeue_after: Some(after),
        }
    }

    fn transition(
        mut status: FilesystemStatus,
        from: FilesystemPhase,
        to: FilesystemPhase,
        reason: &str,
    ) -> Self {
        status.phase = to;
        Self {
            status,
            transition: Some((from, to, reason.to_string())),
            requeue_after: None,
        }
    }
}

/// Drives filesystem records through their lifecycle phases.
pub struct Reconciler {
    config: ControlConfig,
    store: Arc<FilesystemStore>,
    pools: Arc<PoolManager>,
    scheduler: Arc<MetadataScheduler>,
    exports: Arc<ExportCoordinator>,
    events: Arc<EventBus>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Reconciler {
    /// Assemble a reconciler over the collaborating managers.
    pub fn new(
        config: ControlConfig,
        store: Arc<FilesystemStore>,
        pools: Arc<PoolManager>,
        scheduler: Arc<MetadataScheduler>,
        exports: Arc<ExportCoordinator>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            config,
            store,
            pools,
            scheduler,
            exports,
            events,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run one idempotent pass for a filesystem.
    pub async fn reconcile(&self, name: &str) -> Result<ReconcileOutcome, ControlError> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;

        let record = self
            .store
            .get(name)
            .await
            .ok_or_else(|| ControlError::NotFound {
                name: name.to_string(),
            })?;
        let generation = record.generation;

        let step = if record.deletion_requested && record.status.phase.can_request_delete() {
            self.step_enter_deleting(&record)
        } else {
            match record.status.phase {
                FilesystemPhase::Requested => self.step_requested(&record),
                FilesystemPhase::ProvisioningPools => self.step_provision_pools(&record).await,
                FilesystemPhase::SchedulingMetadata => self.step_schedule_metadata(&record).await,
                FilesystemPhase::Active | FilesystemPhase::Degraded => {
                    self.step_serving(&record).await
                }
                FilesystemPhase::Deleting => self.step_deleting(&record).await,
                FilesystemPhase::Deleted | FilesystemPhase::Failed => {
                    StepResult::settled(record.status.clone())
                }
            }
        };

        let StepResult {
            status,
            transition,
            requeue_after,
        } = step;

        match self.store.update_status(name, generation, status).await {
            Ok(()) => {}
            Err(ControlError::StaleGeneration { .. }) => {
                debug!(filesystem = name, "pass superseded by newer spec generation");
                return Ok(ReconcileOutcome {
                    transition: None,
                    requeue_after: Some(Duration::ZERO),
                });
            }
            Err(err) => return Err(err),
        }

        if let Some((from, to, reason)) = transition {
            info!(filesystem = name, %from, %to, reason = %reason, "phase transition");
            self.events.publish(TransitionEvent {
                filesystem: name.to_string(),
                from,
                to,
                reason,
                timestamp_secs: now_secs(),
            });
            if to == FilesystemPhase::Deleted {
                self.store.entomb(name).await?;
                self.locks.remove(name);
            }
            return Ok(ReconcileOutcome {
                transition: Some((from, to)),
                requeue_after,
            });
        }
        Ok(ReconcileOutcome {
            transition: None,
            requeue_after,
        })
    }

    fn step_requested(&self, record: &FilesystemRecord) -> StepResult {
        let mut status = record.status.clone();
        match record.spec.validate() {
            Ok(()) => StepResult::transition(
                status,
                FilesystemPhase::Requested,
                FilesystemPhase::ProvisioningPools,
                "spec validated",
            ),
            Err(err) => {
                status.last_error = Some(err.to_string());
                StepResult::transition(
                    status,
                    FilesystemPhase::Requested,
                    FilesystemPhase::Failed,
                    "spec rejected",
                )
            }
        }
    }

    async fn step_provision_pools(&self, record: &FilesystemRecord) -> StepResult {
        let mut status = record.status.clone();
        match self.provision_pools(&record.spec).await {
            Ok(pool_ids) => {
                status.pools = pool_ids;
                status.attempts = 0;
                status.last_error = None;
                StepResult::transition(
                    status,
                    FilesystemPhase::ProvisioningPools,
                    FilesystemPhase::SchedulingMetadata,
                    "pools provisioned",
                )
            }
            Err(err) if err.is_transient() => {
                status.attempts += 1;
                status.last_error = Some(err.to_string());
                if self.config.pool_backoff.exhausted(status.attempts) {
                    warn!(
                        filesystem = %record.spec.name,
                        attempts = status.attempts,
                        "pool provisioning retry budget exhausted"
                    );
                    StepResult::transition(
                        status,
                        FilesystemPhase::ProvisioningPools,
                        FilesystemPhase::Failed,
                        "pool provisioning retry budget exhausted",
                    )
                } else {
                    let delay = self.config.pool_backoff.delay_for(status.attempts - 1);
                    StepResult::requeue(status, delay)
                }
            }
            Err(err) => {
                status.last_error = Some(err.to_string());
                StepResult::transition(
                    status,
                    FilesystemPhase::ProvisioningPools,
                    FilesystemPhase::Failed,
                    "unrecoverable pool error",
                )
            }
        }
    }

    async fn provision_pools(&self, spec: &FilesystemSpec) -> Result<Vec<PoolId>, ControlError> {
        let metadata_capacity =
            (spec.capacity_bytes / METADATA_POOL_DIVISOR).max(METADATA_POOL_FLOOR_BYTES);
        let pool_specs = [
            PoolSpec {
                name: spec.data_pool_name(),
                kind: PoolKind::Data,
                replication: spec.data_replication,
                capacity_bytes: spec.capacity_bytes,
            },
            PoolSpec {
                name: spec.metadata_pool_name(),
                kind: PoolKind::Metadata,
                replication: spec.metadata_replication,
                capacity_bytes: metadata_capacity,
            },
        ];
        let mut ids = Vec::with_capacity(pool_specs.len());
        for pool_spec in pool_specs {
            let id = self.pools.create_pool(pool_spec).await?;
            self.pools.add_reference(id, &spec.name).await?;
            ids.push(id);
        }
        Ok(ids)
    }

    async fn step_schedule_metadata(&self, record: &FilesystemRecord) -> StepResult {
        let name = &record.spec.name;
        let mut status = record.status.clone();

        match self
            .scheduler
            .schedule(name, record.spec.metadata_replicas)
            .await
        {
            Ok(instances) => {
                status.instances = instances.iter().map(|i| i.id).collect();
                status.attempts = 0;
            }
            Err(err) => {
                let err = ControlError::from(err);
                status.attempts += 1;
                status.last_error = Some(err.to_string());
                if !err.is_transient() || self.config.pool_backoff.exhausted(status.attempts) {
                    return StepResult::transition(
                        status,
                        FilesystemPhase::SchedulingMetadata,
                        FilesystemPhase::Failed,
                        "metadata scheduling failed",
                    );
                }
                let delay = self.config.pool_backoff.delay_for(status.attempts - 1);
                return StepResult::requeue(status, delay);
            }
        }

        if self.scheduler.has_healthy_active(name).await {
            match self.publish_endpoint(name).await {
                Some(endpoint) => {
                    status.endpoint = Some(endpoint);
                    status.last_error = None;
                    StepResult::transition(
                        status,
                        FilesystemPhase::SchedulingMetadata,
                        FilesystemPhase::Active,
                        "metadata service healthy, export published",
                    )
                }
                None => StepResult::requeue(status, self.config.health_poll()),
            }
        } else {
            StepResult::requeue(status, self.config.health_poll())
        }
    }

    async fn step_serving(&self, record: &FilesystemRecord) -> StepResult {
        let name = &record.spec.name;
        let phase = record.status.phase;
        let mut status = record.status.clone();

        let desired = record.spec.metadata_replicas;
        let live = self.scheduler.live_instance_count(name).await as u32;
        if live < desired {
            if let Err(err) = self.scheduler.schedule(name, desired).await {
                warn!(filesystem = %name, error = %err, "replica top-up failed");
            }
        } else if live > desired {
            if let Err(err) = self.scheduler.shrink(name, desired).await {
                warn!(filesystem = %name, error = %err, "replica shrink failed");
            }
        }
        status.instances = self.scheduler.instance_ids(name).await;

        let healthy = self.scheduler.has_healthy_active(name).await;
        match (phase, healthy) {
            (FilesystemPhase::Active, true) => {
                if let Some(endpoint) = self.refresh_endpoint(name, &status).await {
                    status.endpoint = Some(endpoint);
                }
                StepResult::settled(status)
            }
            (FilesystemPhase::Active, false) => StepResult::transition(
                status,
                FilesystemPhase::Active,
                FilesystemPhase::Degraded,
                "active metadata instance lost",
            ),
            (FilesystemPhase::Degraded, true) => {
                if let Some(endpoint) = self.publish_endpoint(name).await {
                    status.endpoint = Some(endpoint);
                }
                status.last_error = None;
                StepResult::transition(
                    status,
                    FilesystemPhase::Degraded,
                    FilesystemPhase::Active,
                    "metadata service recovered",
                )
            }
            (FilesystemPhase::Degraded, false) => {
                StepResult::requeue(status, self.config.health_poll())
            }
            _ => StepResult::settled(status),
        }
    }

    fn step_enter_deleting(&self, record: &FilesystemRecord) -> StepResult {
        let name = &record.spec.name;
        let status = record.status.clone();
        let from = status.phase;

        // the delete request was mount-guarded, but a mount may have landed since
        if !self.exports.can_delete(name) {
            debug!(filesystem = %name, "delete pending, mounts still registered");
            return StepResult::requeue(status, self.config.health_poll());
        }
        StepResult::transition(status, from, FilesystemPhase::Deleting, "delete requested")
    }

    async fn step_deleting(&self, record: &FilesystemRecord) -> StepResult {
        let name = &record.spec.name;
        let mut status = record.status.clone();

        if let Err(err) = self.exports.withdraw_export(name) {
            status.last_error = Some(err.to_string());
            return StepResult::requeue(status, self.config.health_poll());
        }
        status.endpoint = None;

        match self.scheduler.unschedule(name).await {
            Ok(()) => {
                status.instances.clear();
            }
            Err(SchedError::DrainTimeout { remaining, .. }) => {
                warn!(
                    filesystem = %name,
                    remaining,
                    "metadata drain timed out, awaiting operator intervention"
                );
                status.last_error = Some(
                    ControlError::DrainTimeout {
                        name: name.to_string(),
                    }
                    .to_string(),
                );
                status.instances = self.scheduler.instance_ids(name).await;
                return StepResult::requeue(status, self.config.health_poll());
            }
            Err(err) => {
                let err = ControlError::from(err);
                status.last_error = Some(err.to_string());
                return StepResult::requeue(status, self.config.health_poll());
            }
        }

        let mut remaining_pools = Vec::new();
        for id in status.pools.clone() {
            if let Err(err) = self.pools.remove_reference(id, name).await {
                warn!(filesystem = %name, pool = %id, error = %err, "dereference failed");
            }
            match self.pools.delete_pool(id).await {
                Ok(()) | Err(PoolError::NotFound { .. }) => {}
                Err(err @ PoolError::PoolInUse { .. }) => {
                    warn!(filesystem = %name, pool = %id, error = %err, "pool still referenced, leaving in place");
                }
                Err(err) => {
                    status.last_error = Some(err.to_string());
                    remaining_pools.push(id);
                }
            }
        }
        if !remaining_pools.is_empty() {
            status.pools = remaining_pools;
            return StepResult::requeue(status, self.config.health_poll());
        }

        status.pools.clear();
        status.last_error = None;
        StepResult::transition(
            status,
            FilesystemPhase::Deleting,
            FilesystemPhase::Deleted,
            "teardown complete",
        )
    }

    async fn publish_endpoint(&self, name: &str) -> Option<EndpointInfo> {
        let active = self.scheduler.active_instance(name).await?;
        let address = format!("node-{}:{}", active.node.as_u64(), self.config.export_port);
        Some(self.exports.publish_export(name, &address))
    }

    async fn refresh_endpoint(
        &self,
        name: &str,
        status: &FilesystemStatus,
    ) -> Option<EndpointInfo> {
        let active = self.scheduler.active_instance(name).await?;
        let address = format!("node-{}:{}", active.node.as_u64(), self.config.export_port);
        match status.endpoint.as_ref() {
            Some(current) if current.address == address => None,
            _ => Some(self.exports.publish_export(name, &address)),
        }
    }
}
