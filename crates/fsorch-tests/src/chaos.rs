//! Fault-injecting substrates.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};

use fsorch_pool::{InMemorySubstrate, PoolError, PoolId, PoolSpec, StorageSubstrate};
use fsorch_sched::{InstanceId, NodeId, PlacementSubstrate, RoundRobinPlacement, SchedError};

/// Storage substrate that fails the first N allocations with a capacity
/// error, then behaves normally. Models a cluster that is briefly full.
pub struct FlakyStorage {
    inner: InMemorySubstrate,
    failures_remaining: AtomicU32,
}

impl FlakyStorage {
    /// Substrate with `total_bytes` of capacity that fails `failures` times.
    pub fn new(total_bytes: u64, failures: u32) -> Self {
        Self {
            inner: InMemorySubstrate::new(total_bytes),
            failures_remaining: AtomicU32::new(failures),
        }
    }

    /// Failures still pending.
    pub fn failures_remaining(&self) -> u32 {
        self.failures_remaining.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageSubstrate for FlakyStorage {
    async fn allocate(&self, pool: PoolId, spec: &PoolSpec) -> Result<u64, PoolError> {
        if self.failures_remaining.load(Ordering::SeqCst) > 0 {
            self.failures_remaining.fetch_sub(1, Ordering::SeqCst);
            return Err(PoolError::InsufficientCapacity {
                requested: spec.raw_bytes(),
                available: 0,
            });
        }
        self.inner.allocate(pool, spec).await
    }

    async fn release(&self, pool: PoolId) -> Result<(), PoolError> {
        self.inner.release(pool).await
    }

    async fn available_bytes(&self) -> u64 {
        self.inner.available_bytes().await
    }
}

/// Storage substrate that counts allocation calls.
pub struct CountingStorage {
    inner: InMemorySubstrate,
    allocations: AtomicU32,
}

impl CountingStorage {
    /// Substrate with `total_bytes` of capacity.
    pub fn new(total_bytes: u64) -> Self {
        Self {
            inner: InMemorySubstrate::new(total_bytes),
            allocations: AtomicU32::new(0),
        }
    }

    /// Allocation calls observed so far.
    pub fn allocations(&self) -> u32 {
        self.allocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageSubstrate for CountingStorage {
    async fn allocate(&self, pool: PoolId, spec: &PoolSpec) -> Result<u64, PoolError> {
        self.allocations.fetch_add(1, Ordering::SeqCst);
        self.inner.allocate(pool, spec).await
    }

    async fn release(&self, pool: PoolId) -> Result<(), PoolError> {
        self.inner.release(pool).await
    }

    async fn available_bytes(&self) -> u64 {
        self.inner.available_bytes().await
    }
}

/// Placement substrate whose stops never complete. Launches work normally.
pub struct HangingPlacement {
    inner: RoundRobinPlacement,
}

impl HangingPlacement {
    /// Placement over the given nodes.
    pub fn new(nodes: Vec<u64>) -> Self {
        Self {
            inner: RoundRobinPlacement::new(nodes.into_iter().map(NodeId::new).collect()),
        }
    }
}

#[async_trait]
impl PlacementSubstrate for HangingPlacement {
    async fn launch(&self, filesystem: &str, instance: InstanceId) -> Result<NodeId, SchedError> {
        self.inner.launch(filesystem, instance).await
    }

    async fn stop(&self, _instance: InstanceId) -> Result<(), SchedError> {
        std::future::pending::<()>().await;
        Ok(())
    }
}
