//! Control-plane error taxonomy.
//!
//! Component errors from the pool manager, scheduler and export coordinator
//! are classified into this taxonomy: transient classes are retried with
//! backoff, everything else surfaces to the caller or drives the filesystem
//! to `Failed`.

use thiserror::Error;

use fsorch_export::ExportError;
use fsorch_pool::PoolError;
use fsorch_sched::SchedError;

/// Errors surfaced by the filesystem lifecycle controller.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Bad spec or request; rejected immediately, never retried.
    #[error("validation failed: {reason}")]
    Validation {
        /// What rule the request broke.
        reason: String,
    },
    /// Substrate temporarily unavailable; retried with backoff.
    #[error("transient infrastructure failure: {reason}")]
    TransientInfra {
        /// Underlying cause.
        reason: String,
    },
    /// Name already in use by a different spec.
    #[error("filesystem {name} already exists with a different spec")]
    ResourceConflict {
        /// The contested name.
        name: String,
    },
    /// Delete blocked by live mounts; caller retries after unmount.
    #[error("filesystem {name} in use: {mounts} mount(s) outstanding")]
    FilesystemInUse {
        /// Filesystem name.
        name: String,
        /// Live mount registrations.
        mounts: usize,
    },
    /// Teardown exceeded its grace period; operator intervention required.
    #[error("drain timed out for filesystem {name}")]
    DrainTimeout {
        /// Filesystem name.
        name: String,
    },
    /// No filesystem with this name.
    #[error("filesystem {name} not found")]
    NotFound {
        /// Filesystem name.
        name: String,
    },
    /// A newer spec generation superseded the reconciliation pass.
    #[error("stale generation for filesystem {name}: observed {observed}, current {current}")]
    StaleGeneration {
        /// Filesystem name.
        name: String,
        /// Generation the pass captured at entry.
        observed: u64,
        /// Generation actually current.
        current: u64,
    },
}

impl ControlError {
    /// Whether the reconciler may retry with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, ControlError::TransientInfra { .. })
    }
}

impl From<PoolError> for ControlError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::InvalidReplication { .. } => ControlError::Validation {
                reason: err.to_string(),
            },
            PoolError::SpecMismatch { name } => ControlError::ResourceConflict { name },
            PoolError::InsufficientCapacity { .. }
            | PoolError::SubstrateUnavailable { .. }
            | PoolError::PoolInUse { .. }
            | PoolError::NotFound { .. } => ControlError::TransientInfra {
                reason: err.to_string(),
            },
        }
    }
}

impl From<SchedError> for ControlError {
    fn from(err: SchedError) -> Self {
        match err {
            SchedError::DrainTimeout { filesystem, .. } => {
                ControlError::DrainTimeout { name: filesystem }
            }
            SchedError::NoPlacementCapacity { .. }
            | SchedError::SubstrateUnavailable { .. }
            | SchedError::NotScheduled { .. }
            | SchedError::InstanceNotFound { .. }
            | SchedError::LeaseTokenMismatch { .. } => ControlError::TransientInfra {
                reason: err.to_string(),
            },
        }
    }
}

impl From<ExportError> for ControlError {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::MountsActive { filesystem, count } => ControlError::FilesystemInUse {
                name: filesystem,
                mounts: count,
            },
            ExportError::NotExported { .. } => ControlError::TransientInfra {
                reason: err.to_string(),
            },
            ExportError::NotRegistered { .. } => ControlError::Validation {
                reason: err.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ControlError::TransientInfra {
            reason: "x".to_string()
        }
        .is_transient());
        assert!(!ControlError::Validation {
            reason: "x".to_string()
        }
        .is_transient());
        assert!(!ControlError::DrainTimeout {
            name: "testfs".to_string()
        }
        .is_transient());
    }

    #[test]
    fn test_insufficient_capacity_maps_transient() {
        let err = ControlError::from(PoolError::InsufficientCapacity {
            requested: 100,
            available: 0,
        });
        assert!(err.is_transient());
    }

    #[test]
    fn test_invalid_replication_maps_validation() {
        let err = ControlError::from(PoolError::InvalidReplication {
            reason: "zero copies".to_string(),
        });
        assert!(matches!(err, ControlError::Validation { .. }));
    }

    #[test]
    fn test_pool_spec_mismatch_maps_conflict() {
        let err = ControlError::from(PoolError::SpecMismatch {
            name: "testfs-data".to_string(),
        });
        assert!(matches!(err, ControlError::ResourceConflict { .. }));
    }

    #[test]
    fn test_drain_timeout_maps_through() {
        let err = ControlError::from(SchedError::DrainTimeout {
            filesystem: "testfs".to_string(),
            remaining: 1,
        });
        assert!(matches!(err, ControlError::DrainTimeout { .. }));
    }

    #[test]
    fn test_mounts_active_maps_in_use() {
        let err = ControlError::from(ExportError::MountsActive {
            filesystem: "testfs".to_string(),
            count: 3,
        });
        assert!(matches!(
            err,
            ControlError::FilesystemInUse { mounts: 3, .. }
        ));
    }
}
