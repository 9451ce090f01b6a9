//! Error types for pool provisioning.

use thiserror::Error;

/// Errors returned by pool provisioning and teardown.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The substrate cannot satisfy the requested capacity right now.
    #[error("insufficient capacity: requested {requested} bytes, available {available} bytes")]
    InsufficientCapacity {
        /// Raw bytes the allocation needed.
        requested: u64,
        /// Raw bytes the substrate had free.
        available: u64,
    },
    /// The replication policy is malformed and can never be satisfied.
    #[error("invalid replication: {reason}")]
    InvalidReplication {
        /// What rule the policy broke.
        reason: String,
    },
    /// A pool with this name exists with a different spec.
    #[error("pool {name} already exists with a different spec")]
    SpecMismatch {
        /// The contested pool name.
        name: String,
    },
    /// The pool is still referenced by at least one filesystem.
    #[error("pool {id} in use by {count} filesystem(s)")]
    PoolInUse {
        /// Raw pool id.
        id: u64,
        /// Number of filesystems still referencing it.
        count: usize,
    },
    /// No pool with this id.
    #[error("pool {id} not found")]
    NotFound {
        /// Raw pool id.
        id: u64,
    },
    /// The substrate is temporarily unreachable.
    #[error("storage substrate unavailable: {reason}")]
    SubstrateUnavailable {
        /// Substrate-reported cause.
        reason: String,
    },
}

impl PoolError {
    /// Whether a retry can succeed without operator intervention.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PoolError::InsufficientCapacity { .. } | PoolError::SubstrateUnavailable { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_capacity_is_transient() {
        let err = PoolError::InsufficientCapacity {
            requested: 100,
            available: 10,
        };
        assert!(err.is_transient());
    }

    #[test]
    fn test_substrate_unavailable_is_transient() {
        let err = PoolError::SubstrateUnavailable {
            reason: "timed out".to_string(),
        };
        assert!(err.is_transient());
    }

    #[test]
    fn test_invalid_replication_is_permanent() {
        let err = PoolError::InvalidReplication {
            reason: "zero copies".to_string(),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn test_spec_mismatch_is_permanent() {
        let err = PoolError::SpecMismatch {
            name: "fs-data".to_string(),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = PoolError::PoolInUse { id: 7, count: 2 };
        assert_eq!(err.to_string(), "pool 7 in use by 2 filesystem(s)");
    }
}
