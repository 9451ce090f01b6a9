//! Metadata service scheduling and supervision.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::SchedError;
use crate::instance::{HealthStatus, InstanceId, MetadataInstance, MetadataRole};
use crate::lease::LeaseTable;
use crate::placement::PlacementSubstrate;

/// Timing knobs for supervision and teardown.
#[derive(Debug, Clone)]
pub struct SchedConfig {
    /// Seconds without a heartbeat before a healthy instance goes Unhealthy.
    pub health_window_secs: u64,
    /// How long unschedule waits for each instance before DrainTimeout.
    pub drain_grace: Duration,
}

impl Default for SchedConfig {
    fn default() -> Self {
        Self {
            health_window_secs: 15,
            drain_grace: Duration::from_secs(30),
        }
    }
}

/// Outcome of one supervision sweep.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    /// An instance was promoted to Active.
    Promoted {
        /// Filesystem swept.
        filesystem: String,
        /// The new Active instance.
        instance: InstanceId,
        /// Fencing token after the promotion.
        token: u64,
    },
    /// The Active instance was lost and no standby could take over.
    ActiveLostNoStandby {
        /// Filesystem swept.
        filesystem: String,
    },
    /// A replacement standby was scheduled after a promotion.
    ReplacementScheduled {
        /// Filesystem swept.
        filesystem: String,
        /// The new standby instance.
        instance: InstanceId,
    },
    /// An instance missed its health window.
    MarkedUnhealthy {
        /// Filesystem swept.
        filesystem: String,
        /// The silent instance.
        instance: InstanceId,
    },
}

/// Schedules and supervises metadata service instances.
///
/// Scheduling is idempotent: re-running keeps existing instances and only
/// launches what is missing, so reconciliation passes can repeat safely.
/// Unhealthy instances do not count toward the replica target; re-running
/// schedules their replacements.
pub struct MetadataScheduler {
    config: SchedConfig,
    placement: Arc<dyn PlacementSubstrate>,
    instances: RwLock<HashMap<String, Vec<MetadataInstance>>>,
    leases: LeaseTable,
    next_instance_id: AtomicU64,
}

impl MetadataScheduler {
    /// Create a scheduler over the given placement substrate.
    pub fn new(config: SchedConfig, placement: Arc<dyn PlacementSubstrate>) -> Self {
        Self {
            config,
            placement,
            instances: RwLock::new(HashMap::new()),
            leases: LeaseTable::new(),
            next_instance_id: AtomicU64::new(1),
        }
    }

    /// Bring the filesystem up to `replica_count` live instances.
    pub async fn schedule(
        &self,
        filesystem: &str,
        replica_count: u32,
    ) -> Result<Vec<MetadataInstance>, SchedError> {
        let live = {
            let instances = self.instances.read().await;
            instances
                .get(filesystem)
                .map(|list| {
                    list.iter()
                        .filter(|i| i.health != HealthStatus::Unhealthy)
                        .count()
                })
                .unwrap_or(0)
        };

        let mut launched = Vec::new();
        for _ in live..replica_count as usize {
            let id = InstanceId::new(self.next_instance_id.fetch_add(1, Ordering::Relaxed));
            let node = self.placement.launch(filesystem, id).await?;
            launched.push(MetadataInstance {
                id,
                filesystem: filesystem.to_string(),
                node,
                role: MetadataRole::Standby,
                health: HealthStatus::Unknown,
                last_heartbeat_secs: 0,
            });
            debug!(filesystem, instance = %id, node = %node, "metadata instance launched");
        }

        let mut instances = self.instances.write().await;
        let entry = instances.entry(filesystem.to_string()).or_default();
        entry.extend(launched);

        if self.leases.current(filesystem).is_none() {
            if let Some(first) = entry.first_mut() {
                let token = self.leases.acquire(filesystem, first.id)?;
                first.role = MetadataRole::Active;
                info!(filesystem, instance = %first.id, token, "active role assigned");
            }
        }
        Ok(entry.clone())
    }

    /// Remove live standbys beyond `target` live instances. Never removes
    /// the Active. Dead standbys are reaped outright and do not count.
    pub async fn shrink(
        &self,
        filesystem: &str,
        target: u32,
    ) -> Result<Vec<InstanceId>, SchedError> {
        let victims = {
            let mut instances = self.instances.write().await;
            let list = instances
                .get_mut(filesystem)
                .ok_or_else(|| SchedError::NotScheduled {
                    filesystem: filesystem.to_string(),
                })?;
            let mut victims = Vec::new();
            let mut i = 0;
            while i < list.len() {
                if list[i].role == MetadataRole::Standby
                    && list[i].health == HealthStatus::Unhealthy
                {
                    victims.push(list.remove(i).id);
                } else {
                    i += 1;
                }
            }
            let mut live = list
                .iter()
                .filter(|i| i.health != HealthStatus::Unhealthy)
                .count() as u32;
            while live > target {
                // newest standby goes first
                let idx = list.iter().rposition(|i| i.role == MetadataRole::Standby);
                match idx {
                    Some(idx) => {
                        victims.push(list.remove(idx).id);
                        live -= 1;
                    }
                    None => break,
                }
            }
            victims
        };
        for id in &victims {
            let _ = self.placement.stop(*id).await;
            debug!(filesystem, instance = %id, "standby removed");
        }
        Ok(victims)
    }

    /// Record a heartbeat from an instance.
    pub async fn record_heartbeat(
        &self,
        filesystem: &str,
        instance: InstanceId,
        now_secs: u64,
    ) -> Result<(), SchedError> {
        let mut instances = self.instances.write().await;
        let list = instances
            .get_mut(filesystem)
            .ok_or_else(|| SchedError::NotScheduled {
                filesystem: filesystem.to_string(),
            })?;
        let inst = list
            .iter_mut()
            .find(|i| i.id == instance)
            .ok_or(SchedError::InstanceNotFound {
                instance: instance.as_u64(),
            })?;
        inst.health = HealthStatus::Healthy;
        inst.last_heartbeat_secs = now_secs;
        Ok(())
    }

    /// Sweep one filesystem: expire silent instances, promote on Active
    /// loss, schedule a replacement standby. Returns the events applied.
    pub async fn supervise(
        &self,
        filesystem: &str,
        now_secs: u64,
    ) -> Result<Vec<SchedulerEvent>, SchedError> {
        let mut events = Vec::new();

        {
            let mut instances = self.instances.write().await;
            let list = match instances.get_mut(filesystem) {
                Some(l) => l,
                None => return Ok(events),
            };
            for inst in list.iter_mut() {
                if inst.health == HealthStatus::Healthy
                    && now_secs.saturating_sub(inst.last_heartbeat_secs)
                        > self.config.health_window_secs
                {
                    inst.health = HealthStatus::Unhealthy;
                    warn!(filesystem, instance = %inst.id, "instance missed health window");
                    events.push(SchedulerEvent::MarkedUnhealthy {
                        filesystem: filesystem.to_string(),
                        instance: inst.id,
                    });
                }
            }
        }

        let (active_unhealthy, observed_token, candidate) = {
            let instances = self.instances.read().await;
            let list = instances.get(filesystem).cloned().unwrap_or_default();
            match self.leases.current(filesystem) {
                Some(lease) => {
                    let active = list.iter().find(|i| i.id == lease.holder);
                    let unhealthy = active
                        .map(|i| i.health != HealthStatus::Healthy)
                        .unwrap_or(true);
                    let candidate = list.iter().find(|i| i.is_promotable()).map(|i| i.id);
                    (unhealthy, lease.token, candidate)
                }
                None => (false, 0, None),
            }
        };

        if active_unhealthy {
            match candidate {
                Some(new_holder) => {
                    match self.leases.promote(filesystem, new_holder, observed_token) {
                        Ok(token) => {
                            let old_active = {
                                let mut instances = self.instances.write().await;
                                let list = match instances.get_mut(filesystem) {
                                    Some(l) => l,
                                    None => return Ok(events),
                                };
                                let old = list
                                    .iter()
                                    .find(|i| i.role == MetadataRole::Active && i.id != new_holder)
                                    .map(|i| i.id);
                                list.retain(|i| {
                                    !(i.role == MetadataRole::Active && i.id != new_holder)
                                });
                                if let Some(inst) = list.iter_mut().find(|i| i.id == new_holder) {
                                    inst.role = MetadataRole::Active;
                                }
                                old
                            };
                            if let Some(old) = old_active {
                                let _ = self.placement.stop(old).await;
                            }
                            info!(filesystem, instance = %new_holder, token, "standby promoted to active");
                            events.push(SchedulerEvent::Promoted {
                                filesystem: filesystem.to_string(),
                                instance: new_holder,
                                token,
                            });

                            let id = InstanceId::new(
                                self.next_instance_id.fetch_add(1, Ordering::Relaxed),
                            );
                            match self.placement.launch(filesystem, id).await {
                                Ok(node) => {
                                    let mut instances = self.instances.write().await;
                                    if let Some(list) = instances.get_mut(filesystem) {
                                        list.push(MetadataInstance {
                                            id,
                                            filesystem: filesystem.to_string(),
                                            node,
                                            role: MetadataRole::Standby,
                                            health: HealthStatus::Unknown,
                                            last_heartbeat_secs: 0,
                                        });
                                    }
                                    events.push(SchedulerEvent::ReplacementScheduled {
                                        filesystem: filesystem.to_string(),
                                        instance: id,
                                    });
                                }
                                Err(err) => {
                                    warn!(filesystem, error = %err, "replacement standby launch failed");
                                }
                            }
                        }
                        Err(SchedError::LeaseTokenMismatch { .. }) => {
                            debug!(filesystem, "promotion raced, lease already moved");
                        }
                        Err(err) => return Err(err),
                    }
                }
                None => {
                    warn!(filesystem, "active metadata instance lost with no promotable standby");
                    events.push(SchedulerEvent::ActiveLostNoStandby {
                        filesystem: filesystem.to_string(),
                    });
                }
            }
        }

        Ok(events)
    }

    /// Whether the lease holder is currently heartbeating.
    pub async fn has_healthy_active(&self, filesystem: &str) -> bool {
        let holder = match self.leases.holder(filesystem) {
            Some(h) => h,
            None => return false,
        };
        let instances = self.instances.read().await;
        instances
            .get(filesystem)
            .map(|list| {
                list.iter()
                    .any(|i| i.id == holder && i.health == HealthStatus::Healthy)
            })
            .unwrap_or(false)
    }

    /// The Active instance, if the lease holder is still scheduled.
    pub async fn active_instance(&self, filesystem: &str) -> Option<MetadataInstance> {
        let holder = self.leases.holder(filesystem)?;
        let instances = self.instances.read().await;
        instances
            .get(filesystem)
            .and_then(|list| list.iter().find(|i| i.id == holder).cloned())
    }

    /// All scheduled instances for a filesystem.
    pub async fn instances(&self, filesystem: &str) -> Vec<MetadataInstance> {
        let instances = self.instances.read().await;
        instances.get(filesystem).cloned().unwrap_or_default()
    }

    /// Ids of all scheduled instances for a filesystem.
    pub async fn instance_ids(&self, filesystem: &str) -> Vec<InstanceId> {
        self.instances(filesystem)
            .await
            .into_iter()
            .map(|i| i.id)
            .collect()
    }

    /// Number of scheduled instances that are not Unhealthy.
    pub async fn live_instance_count(&self, filesystem: &str) -> usize {
        let instances = self.instances.read().await;
        instances
            .get(filesystem)
            .map(|list| {
                list.iter()
                    .filter(|i| i.health != HealthStatus::Unhealthy)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Drain and stop all instances within the grace period.
    pub async fn unschedule(&self, filesystem: &str) -> Result<(), SchedError> {
        let list = {
            let instances = self.instances.read().await;
            instances.get(filesystem).cloned().unwrap_or_default()
        };
        if list.is_empty() {
            let mut instances = self.instances.write().await;
            instances.remove(filesystem);
            self.leases.release(filesystem);
            return Ok(());
        }

        let mut stopped = Vec::new();
        let mut remaining = 0usize;
        for inst in &list {
            match tokio::time::timeout(self.config.drain_grace, self.placement.stop(inst.id)).await
            {
                Ok(Ok(())) => stopped.push(inst.id),
                Ok(Err(err)) => {
                    warn!(filesystem, instance = %inst.id, error = %err, "instance stop failed");
                    remaining += 1;
                }
                Err(_) => {
                    warn!(filesystem, instance = %inst.id, "instance did not stop within grace period");
                    remaining += 1;
                }
            }
        }

        {
            let mut instances = self.instances.write().await;
            if let Some(l) = instances.get_mut(filesystem) {
                l.retain(|i| !stopped.contains(&i.id));
                if l.is_empty() {
                    instances.remove(filesystem);
                }
            }
        }

        if remaining > 0 {
            return Err(SchedError::DrainTimeout {
                filesystem: filesystem.to_string(),
                remaining,
            });
        }
        self.leases.release(filesystem);
        info!(filesystem, drained = stopped.len(), "metadata service unscheduled");
        Ok(())
    }

    /// Discard all instances after a failed drain. Returns how many were dropped.
    pub async fn force_unschedule(&self, filesystem: &str) -> usize {
        let list = {
            let mut instances = self.instances.write().await;
            instances.remove(filesystem).unwrap_or_default()
        };
        for inst in &list {
            let _ = tokio::time::timeout(Duration::from_secs(1), self.placement.stop(inst.id)).await;
        }
        self.leases.release(filesystem);
        list.len()
    }
}
