//! Error types for metadata scheduling.

use thiserror::Error;

/// Errors returned by scheduling, supervision and teardown.
#[derive(Debug, Error)]
pub enum SchedError {
    /// The placement substrate has no node to run an instance on.
    #[error("no placement capacity for filesystem {filesystem}")]
    NoPlacementCapacity {
        /// Filesystem the launch was for.
        filesystem: String,
    },
    /// The filesystem has no scheduled instances.
    #[error("filesystem {filesystem} has no scheduled instances")]
    NotScheduled {
        /// Filesystem name.
        filesystem: String,
    },
    /// No instance with this id.
    #[error("instance {instance} not found")]
    InstanceNotFound {
        /// Raw instance id.
        instance: u64,
    },
    /// Teardown exceeded the drain grace period.
    #[error("drain timed out for filesystem {filesystem}: {remaining} instance(s) still running")]
    DrainTimeout {
        /// Filesystem name.
        filesystem: String,
        /// Instances that did not stop in time.
        remaining: usize,
    },
    /// A promotion raced a concurrent role change.
    #[error("lease token mismatch for filesystem {filesystem}: observed {observed}, current {current}")]
    LeaseTokenMismatch {
        /// Filesystem name.
        filesystem: String,
        /// Token the caller observed.
        observed: u64,
        /// Token actually current.
        current: u64,
    },
    /// The placement substrate is temporarily unreachable.
    #[error("placement substrate unavailable: {reason}")]
    SubstrateUnavailable {
        /// Substrate-reported cause.
        reason: String,
    },
}

impl SchedError {
    /// Whether a retry can succeed without operator intervention.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SchedError::NoPlacementCapacity { .. } | SchedError::SubstrateUnavailable { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_capacity_is_transient() {
        let err = SchedError::NoPlacementCapacity {
            filesystem: "testfs".to_string(),
        };
        assert!(err.is_transient());
    }

    #[test]
    fn test_drain_timeout_is_permanent() {
        let err = SchedError::DrainTimeout {
            filesystem: "testfs".to_string(),
            remaining: 1,
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn test_lease_mismatch_display() {
        let err = SchedError::LeaseTokenMismatch {
            filesystem: "testfs".to_string(),
            observed: 1,
            current: 2,
        };
        assert!(err.to_string().contains("observed 1"));
        assert!(err.to_string().contains("current 2"));
    }
}
