//! Background health supervision.
//!
//! Periodically sweeps every filesystem, lets the scheduler expire silent
//! instances and promote standbys, then runs a reconciliation pass so phase
//! changes (Active/Degraded) and endpoint republishes land. The sweep may
//! race an in-flight pass; the lease token and generation counter keep both
//! sides from acting on stale state.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::warn;

use fsorch_sched::{MetadataScheduler, SchedulerEvent};

use crate::plane::ControlPlane;
use crate::reconciler::Reconciler;
use crate::store::FilesystemStore;
use crate::types::{now_secs, FilesystemPhase};

/// Periodic health sweep over all filesystems.
pub struct HealthSupervisor {
    store: Arc<FilesystemStore>,
    scheduler: Arc<MetadataScheduler>,
    reconciler: Arc<Reconciler>,
    interval: Duration,
}

impl HealthSupervisor {
    /// Build a supervisor from an assembled control plane.
    pub fn new(plane: &ControlPlane) -> Self {
        Self {
            store: plane.store().clone(),
            scheduler: plane.scheduler().clone(),
            reconciler: plane.reconciler().clone(),
            interval: Duration::from_secs(plane.config().supervision_interval_secs),
        }
    }

    /// One sweep over all filesystems at the given clock reading.
    pub async fn tick(&self, now_secs: u64) -> Vec<SchedulerEvent> {
        let mut all = Vec::new();
        for record in self.store.list().await {
            let phase = record.status.phase;
            if !(phase.is_serving() || phase == FilesystemPhase::SchedulingMetadata) {
                continue;
            }
            let name = record.spec.name;
            match self.scheduler.supervise(&name, now_secs).await {
                Ok(events) => {
                    if !events.is_empty() {
                        if let Err(err) = self.reconciler.reconcile(&name).await {
                            warn!(filesystem = %name, error = %err, "post-supervision reconcile failed");
                        }
                    }
                    all.extend(events);
                }
                Err(err) => {
                    warn!(filesystem = %name, error = %err, "supervision sweep failed");
                }
            }
        }
        all
    }

    /// Spawn the periodic supervision loop.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            loop {
                interval.tick().await;
                let _ = self.tick(now_secs()).await;
            }
        })
    }
}
