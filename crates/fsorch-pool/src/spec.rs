//! Pool identity and replication configuration.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::PoolError;

/// Upper bound on full-copy replica counts.
pub const MAX_REPLICA_COUNT: u8 = 16;
/// Upper bound on erasure-coding chunk counts (data or coding).
pub const MAX_EC_CHUNKS: u8 = 32;

/// Unique identifier for a provisioned pool.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PoolId(u64);

impl PoolId {
    /// Creates a new PoolId from a raw u64 value.
    pub fn new(id: u64) -> Self {
        PoolId(id)
    }

    /// Returns the raw u64 value of this pool id.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role of the pool within a filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolKind {
    /// Holds file contents.
    Data,
    /// Holds the filesystem namespace.
    Metadata,
}

/// Data redundancy policy for a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicationPolicy {
    /// N full copies of every object.
    Replicated {
        /// Number of copies, including the primary.
        count: u8,
    },
    /// k data chunks plus m coding chunks per object.
    ErasureCoded {
        /// Data chunks per stripe.
        data_chunks: u8,
        /// Coding chunks per stripe.
        coding_chunks: u8,
    },
}

impl ReplicationPolicy {
    /// Check the policy parameters against their bounds.
    pub fn validate(&self) -> Result<(), PoolError> {
        match self {
            ReplicationPolicy::Replicated { count } => {
                if *count == 0 {
                    return Err(PoolError::InvalidReplication {
                        reason: "replica count must be at least 1".to_string(),
                    });
                }
                if *count > MAX_REPLICA_COUNT {
                    return Err(PoolError::InvalidReplication {
                        reason: format!("replica count {} exceeds maximum {}", count, MAX_REPLICA_COUNT),
                    });
                }
            }
            ReplicationPolicy::ErasureCoded {
                data_chunks,
                coding_chunks,
            } => {
                if *data_chunks == 0 || *coding_chunks == 0 {
                    return Err(PoolError::InvalidReplication {
                        reason: "erasure coding requires at least one data and one coding chunk"
                            .to_string(),
                    });
                }
                if *data_chunks > MAX_EC_CHUNKS || *coding_chunks > MAX_EC_CHUNKS {
                    return Err(PoolError::InvalidReplication {
                        reason: format!("chunk counts exceed maximum {}", MAX_EC_CHUNKS),
                    });
                }
            }
        }
        Ok(())
    }

    /// Raw-capacity multiplier relative to logical bytes.
    pub fn overhead_factor(&self) -> f64 {
        match self {
            ReplicationPolicy::Replicated { count } => *count as f64,
            ReplicationPolicy::ErasureCoded {
                data_chunks,
                coding_chunks,
            } => (*data_chunks as f64 + *coding_chunks as f64) / *data_chunks as f64,
        }
    }
}

/// Desired configuration for one pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSpec {
    /// Pool name, unique across the cluster.
    pub name: String,
    /// Whether this pool holds data or metadata.
    pub kind: PoolKind,
    /// Redundancy policy.
    pub replication: ReplicationPolicy,
    /// Logical capacity to reserve, in bytes.
    pub capacity_bytes: u64,
}

impl PoolSpec {
    /// Validate the spec before provisioning.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.name.is_empty() {
            return Err(PoolError::InvalidReplication {
                reason: "pool name must not be empty".to_string(),
            });
        }
        if self.capacity_bytes == 0 {
            return Err(PoolError::InvalidReplication {
                reason: "pool capacity must be non-zero".to_string(),
            });
        }
        self.replication.validate()
    }

    /// Raw bytes this pool requires on the substrate.
    pub fn raw_bytes(&self) -> u64 {
        (self.capacity_bytes as f64 * self.replication.overhead_factor()).ceil() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn spec(replication: ReplicationPolicy) -> PoolSpec {
        PoolSpec {
            name: "testfs-data".to_string(),
            kind: PoolKind::Data,
            replication,
            capacity_bytes: 1024,
        }
    }

    #[test]
    fn test_replicated_valid() {
        assert!(ReplicationPolicy::Replicated { count: 3 }.validate().is_ok());
    }

    #[test]
    fn test_replicated_zero_invalid() {
        let err = ReplicationPolicy::Replicated { count: 0 }.validate();
        assert!(matches!(err, Err(PoolError::InvalidReplication { .. })));
    }

    #[test]
    fn test_replicated_over_max_invalid() {
        let err = ReplicationPolicy::Replicated {
            count: MAX_REPLICA_COUNT + 1,
        }
        .validate();
        assert!(matches!(err, Err(PoolError::InvalidReplication { .. })));
    }

    #[test]
    fn test_erasure_coded_valid() {
        let policy = ReplicationPolicy::ErasureCoded {
            data_chunks: 4,
            coding_chunks: 2,
        };
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_erasure_coded_zero_chunks_invalid() {
        let policy = ReplicationPolicy::ErasureCoded {
            data_chunks: 0,
            coding_chunks: 2,
        };
        assert!(matches!(
            policy.validate(),
            Err(PoolError::InvalidReplication { .. })
        ));
    }

    #[test]
    fn test_overhead_replicated() {
        let policy = ReplicationPolicy::Replicated { count: 3 };
        assert_eq!(policy.overhead_factor(), 3.0);
    }

    #[test]
    fn test_overhead_erasure_coded() {
        let policy = ReplicationPolicy::ErasureCoded {
            data_chunks: 4,
            coding_chunks: 2,
        };
        assert!((policy.overhead_factor() - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_spec_empty_name_invalid() {
        let mut s = spec(ReplicationPolicy::Replicated { count: 1 });
        s.name.clear();
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_spec_zero_capacity_invalid() {
        let mut s = spec(ReplicationPolicy::Replicated { count: 1 });
        s.capacity_bytes = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_raw_bytes_replicated() {
        let s = spec(ReplicationPolicy::Replicated { count: 2 });
        assert_eq!(s.raw_bytes(), 2048);
    }

    #[test]
    fn test_pool_id_display() {
        assert_eq!(PoolId::new(42).to_string(), "42");
    }

    #[test]
    fn test_serde_roundtrip() {
        let s = spec(ReplicationPolicy::ErasureCoded {
            data_chunks: 4,
            coding_chunks: 2,
        });
        let json = serde_json::to_string(&s).unwrap();
        let decoded: PoolSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, s);
    }

    proptest! {
        #[test]
        fn prop_replicated_in_bounds_always_valid(count in 1u8..=MAX_REPLICA_COUNT) {
            let policy = ReplicationPolicy::Replicated { count };
            prop_assert!(policy.validate().is_ok());
        }

        #[test]
        fn prop_raw_bytes_never_below_logical(
            count in 1u8..=MAX_REPLICA_COUNT,
            capacity in 1u64..1_000_000_000u64,
        ) {
            let s = PoolSpec {
                name: "p".to_string(),
                kind: PoolKind::Data,
                replication: ReplicationPolicy::Replicated { count },
                capacity_bytes: capacity,
            };
            prop_assert!(s.raw_bytes() >= capacity);
        }
    }
}
