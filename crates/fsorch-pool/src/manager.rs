//! Pool provisioning and teardown.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::PoolError;
use crate::spec::{PoolId, PoolSpec};
use crate::substrate::StorageSubstrate;

/// A provisioned pool with its reference set.
#[derive(Debug, Clone)]
pub struct ProvisionedPool {
    /// Pool identity.
    pub id: PoolId,
    /// The spec the pool was created from.
    pub spec: PoolSpec,
    /// Raw bytes reserved on the substrate.
    pub raw_bytes: u64,
    /// Names of filesystems referencing this pool.
    pub references: HashSet<String>,
}

impl ProvisionedPool {
    /// Whether any filesystem still references this pool.
    pub fn is_referenced(&self) -> bool {
        !self.references.is_empty()
    }
}

/// Creates and destroys the storage pools backing filesystems.
///
/// Creation is idempotent by name: an identical spec under an existing name
/// returns the existing handle, so reconciliation passes can re-run safely.
pub struct PoolManager {
    substrate: Arc<dyn StorageSubstrate>,
    pools: RwLock<HashMap<String, ProvisionedPool>>,
    next_id: AtomicU64,
}

impl PoolManager {
    /// Create a manager over the given substrate.
    pub fn new(substrate: Arc<dyn StorageSubstrate>) -> Self {
        Self {
            substrate,
            pools: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Provision a pool, or return the existing handle for an identical spec.
    pub async fn create_pool(&self, spec: PoolSpec) -> Result<PoolId, PoolError> {
        spec.validate()?;

        {
            let pools = self.pools.read().await;
            if let Some(existing) = pools.get(&spec.name) {
                if existing.spec == spec {
                    return Ok(existing.id);
                }
                return Err(PoolError::SpecMismatch {
                    name: spec.name.clone(),
                });
            }
        }

        let id = PoolId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let raw_bytes = self.substrate.allocate(id, &spec).await?;

        let mut pools = self.pools.write().await;
        let raced = pools.get(&spec.name).map(|p| (p.id, p.spec == spec));
        if let Some((winner, same)) = raced {
            drop(pools);
            let _ = self.substrate.release(id).await;
            return if same {
                Ok(winner)
            } else {
                Err(PoolError::SpecMismatch { name: spec.name })
            };
        }
        info!(pool = %id, name = %spec.name, raw_bytes, "pool provisioned");
        pools.insert(
            spec.name.clone(),
            ProvisionedPool {
                id,
                spec,
                raw_bytes,
                references: HashSet::new(),
            },
        );
        Ok(id)
    }

    /// Tear a pool down. Refuses while any filesystem references it.
    pub async fn delete_pool(&self, id: PoolId) -> Result<(), PoolError> {
        let mut pools = self.pools.write().await;
        let entry = pools
            .iter()
            .find(|(_, p)| p.id == id)
            .map(|(name, p)| (name.clone(), p.references.len()));
        let (name, refs) = match entry {
            Some(e) => e,
            None => return Err(PoolError::NotFound { id: id.as_u64() }),
        };
        if refs > 0 {
            return Err(PoolError::PoolInUse {
                id: id.as_u64(),
                count: refs,
            });
        }
        pools.remove(&name);
        drop(pools);
        self.substrate.release(id).await?;
        info!(pool = %id, name = %name, "pool released");
        Ok(())
    }

    /// Record that `filesystem` uses this pool.
    pub async fn add_reference(&self, id: PoolId, filesystem: &str) -> Result<(), PoolError> {
        let mut pools = self.pools.write().await;
        let pool = pools
            .values_mut()
            .find(|p| p.id == id)
            .ok_or(PoolError::NotFound { id: id.as_u64() })?;
        pool.references.insert(filesystem.to_string());
        Ok(())
    }

    /// Drop `filesystem`'s reference. Missing pool or reference is not an error.
    pub async fn remove_reference(&self, id: PoolId, filesystem: &str) -> Result<(), PoolError> {
        let mut pools = self.pools.write().await;
        if let Some(pool) = pools.values_mut().find(|p| p.id == id) {
            pool.references.remove(filesystem);
        }
        Ok(())
    }

    /// Look a pool up by id.
    pub async fn get_pool(&self, id: PoolId) -> Option<ProvisionedPool> {
        let pools = self.pools.read().await;
        pools.values().find(|p| p.id == id).cloned()
    }

    /// Look a pool up by name.
    pub async fn find_by_name(&self, name: &str) -> Option<ProvisionedPool> {
        let pools = self.pools.read().await;
        pools.get(name).cloned()
    }

    /// All provisioned pools.
    pub async fn list_pools(&self) -> Vec<ProvisionedPool> {
        let pools = self.pools.read().await;
        pools.values().cloned().collect()
    }

    /// Number of provisioned pools.
    pub async fn count(&self) -> usize {
        let pools = self.pools.read().await;
        pools.len()
    }
}
