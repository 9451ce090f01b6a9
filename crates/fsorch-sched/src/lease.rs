//! Active-role leases with compare-and-swap promotion.
//!
//! Exactly one instance may hold the Active role per filesystem. Every role
//! change goes through a token CAS: a promotion carries the token the caller
//! last observed and fails when another promotion got there first, so two
//! supervisors racing across a partition cannot both install an Active.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::SchedError;
use crate::instance::InstanceId;

/// The Active-role lease for one filesystem.
#[derive(Debug, Clone)]
pub struct ActiveLease {
    /// Filesystem the lease covers.
    pub filesystem: String,
    /// Instance currently holding Active.
    pub holder: InstanceId,
    /// Fencing token, bumped on every promotion.
    pub token: u64,
}

/// Tracks which instance holds Active per filesystem.
pub struct LeaseTable {
    leases: RwLock<HashMap<String, ActiveLease>>,
}

impl LeaseTable {
    /// Create an empty lease table.
    pub fn new() -> Self {
        Self {
            leases: RwLock::new(HashMap::new()),
        }
    }

    /// Install the first holder. Fails if a lease already exists.
    pub fn acquire(&self, filesystem: &str, holder: InstanceId) -> Result<u64, SchedError> {
        let mut leases = self.leases.write().unwrap();
        if let Some(existing) = leases.get(filesystem) {
            return Err(SchedError::LeaseTokenMismatch {
                filesystem: filesystem.to_string(),
                observed: 0,
                current: existing.token,
            });
        }
        leases.insert(
            filesystem.to_string(),
            ActiveLease {
                filesystem: filesystem.to_string(),
                holder,
                token: 1,
            },
        );
        Ok(1)
    }

    /// Move the lease to `new_holder`. `observed` must match the current token.
    pub fn promote(
        &self,
        filesystem: &str,
        new_holder: InstanceId,
        observed: u64,
    ) -> Result<u64, SchedError> {
        let mut leases = self.leases.write().unwrap();
        let lease = leases
            .get_mut(filesystem)
            .ok_or_else(|| SchedError::NotScheduled {
                filesystem: filesystem.to_string(),
            })?;
        if lease.token != observed {
            return Err(SchedError::LeaseTokenMismatch {
                filesystem: filesystem.to_string(),
                observed,
                current: lease.token,
            });
        }
        lease.holder = new_holder;
        lease.token += 1;
        Ok(lease.token)
    }

    /// The current lease, if any.
    pub fn current(&self, filesystem: &str) -> Option<ActiveLease> {
        let leases = self.leases.read().unwrap();
        leases.get(filesystem).cloned()
    }

    /// The current holder, if any.
    pub fn holder(&self, filesystem: &str) -> Option<InstanceId> {
        let leases = self.leases.read().unwrap();
        leases.get(filesystem).map(|l| l.holder)
    }

    /// Drop the lease on teardown. Returns the released lease, if any.
    pub fn release(&self, filesystem: &str) -> Option<ActiveLease> {
        let mut leases = self.leases.write().unwrap();
        leases.remove(filesystem)
    }

    /// Number of live leases.
    pub fn count(&self) -> usize {
        let leases = self.leases.read().unwrap();
        leases.len()
    }
}

impl Default for LeaseTable {
    fn default() -> Self {
        Self::new()
    }
}
