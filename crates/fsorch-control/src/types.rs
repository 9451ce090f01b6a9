//! Filesystem specs, phases and status.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use fsorch_export::EndpointInfo;
use fsorch_pool::{PoolId, ReplicationPolicy};
use fsorch_sched::InstanceId;

use crate::error::ControlError;

/// Longest accepted filesystem name.
pub const MAX_NAME_LEN: usize = 63;
/// Most metadata service instances a single filesystem may request.
pub const MAX_METADATA_REPLICAS: u32 = 16;

/// Lifecycle phase of a filesystem resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilesystemPhase {
    /// Accepted, not yet acted on.
    Requested,
    /// Data and metadata pools being provisioned.
    ProvisioningPools,
    /// Metadata service instances being scheduled.
    SchedulingMetadata,
    /// Serving; export published.
    Active,
    /// Serving impaired: Active metadata instance lost, no standby promoted.
    Degraded,
    /// Teardown in progress.
    Deleting,
    /// Torn down; only the tombstone remains.
    Deleted,
    /// Unrecoverable; last error recorded in status.
    Failed,
}

impl FilesystemPhase {
    /// Whether the phase is final.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FilesystemPhase::Deleted | FilesystemPhase::Failed)
    }

    /// Whether the filesystem is serving clients.
    pub fn is_serving(&self) -> bool {
        matches!(self, FilesystemPhase::Active | FilesystemPhase::Degraded)
    }

    /// Phases from which a delete request is honored.
    pub fn can_request_delete(&self) -> bool {
        matches!(
            self,
            FilesystemPhase::Active | FilesystemPhase::Degraded | FilesystemPhase::Failed
        )
    }
}

impl fmt::Display for FilesystemPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FilesystemPhase::Requested => "requested",
            FilesystemPhase::ProvisioningPools => "provisioning-pools",
            FilesystemPhase::SchedulingMetadata => "scheduling-metadata",
            FilesystemPhase::Active => "active",
            FilesystemPhase::Degraded => "degraded",
            FilesystemPhase::Deleting => "deleting",
            FilesystemPhase::Deleted => "deleted",
            FilesystemPhase::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Declarative filesystem request.
///
/// Immutable after creation except for `metadata_replicas` scaling. Deep
/// replication parameters are the pool manager's to judge; admission only
/// checks request shape, so a bad policy fails during provisioning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilesystemSpec {
    /// Name, unique within the cluster.
    pub name: String,
    /// Redundancy for the data pool.
    pub data_replication: ReplicationPolicy,
    /// Redundancy for the metadata pool.
    pub metadata_replication: ReplicationPolicy,
    /// Desired metadata service instances (one Active, rest Standby).
    pub metadata_replicas: u32,
    /// Logical data capacity in bytes.
    pub capacity_bytes: u64,
}

impl FilesystemSpec {
    /// Check the request shape.
    pub fn validate(&self) -> Result<(), ControlError> {
        if self.name.is_empty() || self.name.len() > MAX_NAME_LEN {
            return Err(ControlError::Validation {
                reason: format!("name must be 1..={} characters", MAX_NAME_LEN),
            });
        }
        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(ControlError::Validation {
                reason: "name must be lowercase alphanumeric or '-'".to_string(),
            });
        }
        if self.metadata_replicas == 0 || self.metadata_replicas > MAX_METADATA_REPLICAS {
            return Err(ControlError::Validation {
                reason: format!("metadata replicas must be 1..={}", MAX_METADATA_REPLICAS),
            });
        }
        if self.capacity_bytes == 0 {
            return Err(ControlError::Validation {
                reason: "capacity must be non-zero".to_string(),
            });
        }
        Ok(())
    }

    /// Name of the data pool backing this filesystem.
    pub fn data_pool_name(&self) -> String {
        format!("{}-data", self.name)
    }

    /// Name of the metadata pool backing this filesystem.
    pub fn metadata_pool_name(&self) -> String {
        format!("{}-meta", self.name)
    }
}

/// Observed state of a filesystem resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesystemStatus {
    /// Current lifecycle phase.
    pub phase: FilesystemPhase,
    /// Pools provisioned for this filesystem.
    pub pools: Vec<PoolId>,
    /// Metadata instances scheduled for this filesystem.
    pub instances: Vec<InstanceId>,
    /// Published endpoint, once serving.
    pub endpoint: Option<EndpointInfo>,
    /// Most recent error, if any.
    pub last_error: Option<String>,
    /// Transient-failure retries consumed in the current phase.
    pub attempts: u32,
}

impl FilesystemStatus {
    /// Fresh status in `Requested` phase.
    pub fn new() -> Self {
        Self {
            phase: FilesystemPhase::Requested,
            pools: Vec::new(),
            instances: Vec::new(),
            endpoint: None,
            last_error: None,
            attempts: 0,
        }
    }
}

impl Default for FilesystemStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// A filesystem record: desired spec plus observed status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesystemRecord {
    /// Desired state.
    pub spec: FilesystemSpec,
    /// Observed state.
    pub status: FilesystemStatus,
    /// Bumped on every spec change; stale passes must not write back.
    pub generation: u64,
    /// Whether teardown has been requested.
    pub deletion_requested: bool,
    /// Seconds-since-epoch of admission.
    pub created_at_secs: u64,
}

/// Audit record left behind by a deleted filesystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tombstone {
    /// Name of the deleted filesystem.
    pub name: String,
    /// Seconds-since-epoch of teardown completion.
    pub deleted_at_secs: u64,
    /// Generation at the time of deletion.
    pub final_generation: u64,
}

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
