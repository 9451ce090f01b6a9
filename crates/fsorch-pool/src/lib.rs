//! Pool provisioning for orchestrated shared filesystems.
//!
//! A filesystem is backed by a data pool and a metadata pool. This crate
//! owns their lifecycle: idempotent creation against an injected storage
//! substrate, reference tracking by the filesystems that use them, and
//! teardown that refuses while references remain.

pub mod error;
pub mod manager;
pub mod spec;
pub mod substrate;

pub use error::PoolError;
pub use manager::{PoolManager, ProvisionedPool};
pub use spec::{PoolId, PoolKind, PoolSpec, ReplicationPolicy};
pub use substrate::{InMemorySubstrate, StorageSubstrate};
