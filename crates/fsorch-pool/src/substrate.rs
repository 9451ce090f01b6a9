//! Storage substrate interface.
//!
//! The substrate is the capacity/replication backend that physically backs
//! pools. It is injected at construction so the pool manager never looks up
//! a platform by name.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::error::PoolError;
use crate::spec::{PoolId, PoolSpec};

/// Capacity backend that physically backs pools.
#[async_trait]
pub trait StorageSubstrate: Send + Sync {
    /// Reserve raw capacity for a pool. Returns the raw bytes reserved.
    /// Reserving again for the same pool id returns the existing reservation.
    async fn allocate(&self, pool: PoolId, spec: &PoolSpec) -> Result<u64, PoolError>;

    /// Release a reservation. Releasing an unknown pool is not an error.
    async fn release(&self, pool: PoolId) -> Result<(), PoolError>;

    /// Raw bytes currently unreserved.
    async fn available_bytes(&self) -> u64;
}

struct SubstrateInner {
    total_bytes: u64,
    reservations: HashMap<PoolId, u64>,
}

impl SubstrateInner {
    fn reserved(&self) -> u64 {
        self.reservations.values().sum()
    }
}

/// In-memory substrate with a fixed raw byte budget.
pub struct InMemorySubstrate {
    inner: Mutex<SubstrateInner>,
}

impl InMemorySubstrate {
    /// Create a substrate with `total_bytes` of raw capacity.
    pub fn new(total_bytes: u64) -> Self {
        Self {
            inner: Mutex::new(SubstrateInner {
                total_bytes,
                reservations: HashMap::new(),
            }),
        }
    }

    /// Number of live reservations.
    pub async fn reservation_count(&self) -> usize {
        self.inner.lock().await.reservations.len()
    }
}

#[async_trait]
impl StorageSubstrate for InMemorySubstrate {
    async fn allocate(&self, pool: PoolId, spec: &PoolSpec) -> Result<u64, PoolError> {
        let mut inner = self.inner.lock().await;
        if let Some(existing) = inner.reservations.get(&pool) {
            return Ok(*existing);
        }
        let raw = spec.raw_bytes();
        let available = inner.total_bytes.saturating_sub(inner.reserved());
        if raw > available {
            return Err(PoolError::InsufficientCapacity {
                requested: raw,
                available,
            });
        }
        inner.reservations.insert(pool, raw);
        Ok(raw)
    }

    async fn release(&self, pool: PoolId) -> Result<(), PoolError> {
        let mut inner = self.inner.lock().await;
        inner.reservations.remove(&pool);
        Ok(())
    }

    async fn available_bytes(&self) -> u64 {
        let inner = self.inner.lock().await;
        inner.total_bytes.saturating_sub(inner.reserved())
    }
}
