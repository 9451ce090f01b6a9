//! Metadata service instances.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a metadata service instance.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(u64);

impl InstanceId {
    /// Creates a new InstanceId from a raw u64 value.
    pub fn new(id: u64) -> Self {
        InstanceId(id)
    }

    /// Returns the raw u64 value of this instance id.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Node an instance was placed on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u64);

impl NodeId {
    /// Creates a new NodeId from a raw u64 value.
    pub fn new(id: u64) -> Self {
        NodeId(id)
    }

    /// Returns the raw u64 value of this node id.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role of an instance within its filesystem's metadata service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataRole {
    /// Serving namespace operations.
    Active,
    /// Warm spare, promotable on Active loss.
    Standby,
}

/// Last observed health of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Heartbeating within the health window.
    Healthy,
    /// Missed its health window.
    Unhealthy,
    /// Never heartbeated yet.
    Unknown,
}

/// A scheduled metadata service instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataInstance {
    /// Instance identity.
    pub id: InstanceId,
    /// Filesystem this instance serves.
    pub filesystem: String,
    /// Node the placement substrate chose.
    pub node: NodeId,
    /// Current role.
    pub role: MetadataRole,
    /// Last observed health.
    pub health: HealthStatus,
    /// Seconds-since-epoch of the last heartbeat; 0 before the first one.
    pub last_heartbeat_secs: u64,
}

impl MetadataInstance {
    /// Whether this instance holds the Active role.
    pub fn is_active(&self) -> bool {
        self.role == MetadataRole::Active
    }

    /// Whether this instance can take over the Active role.
    pub fn is_promotable(&self) -> bool {
        self.role == MetadataRole::Standby && self.health == HealthStatus::Healthy
    }
}
