//! Filesystem spec/status store.
//!
//! Records are keyed by name. Every spec change bumps the generation
//! counter; status writebacks carry the generation their pass observed and
//! are rejected when superseded. Deleted filesystems leave a tombstone that
//! is garbage-collected after a retention window.

use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::ControlError;
use crate::types::{
    now_secs, FilesystemRecord, FilesystemSpec, FilesystemStatus, Tombstone,
};

/// In-memory store of filesystem records and tombstones.
pub struct FilesystemStore {
    records: RwLock<HashMap<String, FilesystemRecord>>,
    tombstones: RwLock<Vec<Tombstone>>,
}

impl FilesystemStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            tombstones: RwLock::new(Vec::new()),
        }
    }

    /// Admit a filesystem in `Requested` phase.
    ///
    /// Identical spec under an existing name returns the existing record;
    /// a differing spec is a conflict.
    pub async fn create(&self, spec: FilesystemSpec) -> Result<FilesystemRecord, ControlError> {
        spec.validate()?;
        let mut records = self.records.write().await;
        if let Some(existing) = records.get(&spec.name) {
            if existing.spec == spec {
                return Ok(existing.clone());
            }
            return Err(ControlError::ResourceConflict {
                name: spec.name.clone(),
            });
        }
        let record = FilesystemRecord {
            spec: spec.clone(),
            status: FilesystemStatus::new(),
            generation: 1,
            deletion_requested: false,
            created_at_secs: now_secs(),
        };
        records.insert(spec.name.clone(), record.clone());
        info!(filesystem = %spec.name, "filesystem requested");
        Ok(record)
    }

    /// Look a record up by name.
    pub async fn get(&self, name: &str) -> Option<FilesystemRecord> {
        let records = self.records.read().await;
        records.get(name).cloned()
    }

    /// All records, sorted by name.
    pub async fn list(&self) -> Vec<FilesystemRecord> {
        let records = self.records.read().await;
        let mut list: Vec<FilesystemRecord> = records.values().cloned().collect();
        list.sort_by(|a, b| a.spec.name.cmp(&b.spec.name));
        list
    }

    /// Names of all records.
    pub async fn names(&self) -> Vec<String> {
        let records = self.records.read().await;
        let mut names: Vec<String> = records.keys().cloned().collect();
        names.sort();
        names
    }

    /// Mark deletion desired. Only honored in phases that allow it.
    pub async fn request_delete(&self, name: &str) -> Result<u64, ControlError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(name)
            .ok_or_else(|| ControlError::NotFound {
                name: name.to_string(),
            })?;
        if record.deletion_requested {
            return Ok(record.generation);
        }
        if !record.status.phase.can_request_delete() {
            return Err(ControlError::Validation {
                reason: format!(
                    "cannot delete filesystem in phase {}",
                    record.status.phase
                ),
            });
        }
        record.deletion_requested = true;
        record.generation += 1;
        info!(filesystem = name, generation = record.generation, "deletion requested");
        Ok(record.generation)
    }

    /// Change the desired metadata replica count. Serving phases only.
    pub async fn scale_replicas(&self, name: &str, replicas: u32) -> Result<u64, ControlError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(name)
            .ok_or_else(|| ControlError::NotFound {
                name: name.to_string(),
            })?;
        if !record.status.phase.is_serving() {
            return Err(ControlError::Validation {
                reason: format!(
                    "cannot scale filesystem in phase {}",
                    record.status.phase
                ),
            });
        }
        let mut updated = record.spec.clone();
        updated.metadata_replicas = replicas;
        updated.validate()?;
        if record.spec.metadata_replicas == replicas {
            return Ok(record.generation);
        }
        record.spec = updated;
        record.generation += 1;
        info!(filesystem = name, replicas, generation = record.generation, "replicas scaled");
        Ok(record.generation)
    }

    /// Write back a status produced by a pass that observed `generation`.
    /// Rejected when a newer generation superseded the pass.
    pub async fn update_status(
        &self,
        name: &str,
        generation: u64,
        status: FilesystemStatus,
    ) -> Result<(), ControlError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(name)
            .ok_or_else(|| ControlError::NotFound {
                name: name.to_string(),
            })?;
        if record.generation != generation {
            debug!(
                filesystem = name,
                observed = generation,
                current = record.generation,
                "stale status writeback dropped"
            );
            return Err(ControlError::StaleGeneration {
                name: name.to_string(),
                observed: generation,
                current: record.generation,
            });
        }
        record.status = status;
        Ok(())
    }

    /// Replace a `Deleted` record with its tombstone.
    pub async fn entomb(&self, name: &str) -> Result<Tombstone, ControlError> {
        let record = {
            let mut records = self.records.write().await;
            records.remove(name).ok_or_else(|| ControlError::NotFound {
                name: name.to_string(),
            })?
        };
        let tombstone = Tombstone {
            name: name.to_string(),
            deleted_at_secs: now_secs(),
            final_generation: record.generation,
        };
        self.tombstones.write().await.push(tombstone.clone());
        info!(filesystem = name, "filesystem entombed");
        Ok(tombstone)
    }

    /// The tombstone for a deleted filesystem, if still retained.
    pub async fn tombstone(&self, name: &str) -> Option<Tombstone> {
        let tombstones = self.tombstones.read().await;
        tombstones.iter().find(|t| t.name == name).cloned()
    }

    /// All retained tombstones.
    pub async fn tombstones(&self) -> Vec<Tombstone> {
        let tombstones = self.tombstones.read().await;
        tombstones.clone()
    }

    /// Drop tombstones older than the retention window. Returns how many.
    pub async fn gc_tombstones(&self, retention_secs: u64, now_secs: u64) -> usize {
        let mut tombstones = self.tombstones.write().await;
        let before = tombstones.len();
        tombstones.retain(|t| now_secs.saturating_sub(t.deleted_at_secs) < retention_secs);
        before - tombstones.len()
    }

    /// Number of live records.
    pub async fn count(&self) -> usize {
        let records = self.records.read().await;
        records.len()
    }
}

impl Default for FilesystemStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FilesystemPhase;
    use fsorch_pool::ReplicationPolicy;

    fn spec(name: &str) -> FilesystemSpec {
        FilesystemSpec {
            name: name.to_string(),
            data_replication: ReplicationPolicy::Replicated { count: 1 },
            metadata_replication: ReplicationPolicy::Replicated { count: 1 },
            metadata_replicas: 1,
            capacity_bytes: 1 << 30,
        }
    }

    async fn store_with(name: &str, phase: FilesystemPhase) -> FilesystemStore {
        let store = FilesystemStore::new();
        let record = store.create(spec(name)).await.unwrap();
        let mut status = record.status.clone();
        status.phase = phase;
        store
            .update_status(name, record.generation, status)
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_create() {
        let store = FilesystemStore::new();
        let record = store.create(spec("testfs")).await.unwrap();
        assert_eq!(record.generation, 1);
        assert_eq!(record.status.phase, FilesystemPhase::Requested);
        assert!(!record.deletion_requested);
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn test_create_identical_spec_idempotent() {
        let store = FilesystemStore::new();
        store.create(spec("testfs")).await.unwrap();
        let again = store.create(spec("testfs")).await.unwrap();
        assert_eq!(again.generation, 1);
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn test_create_conflicting_spec_rejected() {
        let store = FilesystemStore::new();
        store.create(spec("testfs")).await.unwrap();
        let mut other = spec("testfs");
        other.capacity_bytes = 42;
        let err = store.create(other).await;
        assert!(matches!(err, Err(ControlError::ResourceConflict { .. })));
    }

    #[tokio::test]
    async fn test_create_invalid_spec_rejected() {
        let store = FilesystemStore::new();
        let err = store.create(spec("BAD_NAME")).await;
        assert!(matches!(err, Err(ControlError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_list_sorted() {
        let store = FilesystemStore::new();
        store.create(spec("zeta")).await.unwrap();
        store.create(spec("alpha")).await.unwrap();
        let names: Vec<String> = store.list().await.iter().map(|r| r.spec.name.clone()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[tokio::test]
    async fn test_request_delete_bumps_generation() {
        let store = store_with("testfs", FilesystemPhase::Active).await;
        let generation = store.request_delete("testfs").await.unwrap();
        assert_eq!(generation, 2);
        assert!(store.get("testfs").await.unwrap().deletion_requested);
    }

    #[tokio::test]
    async fn test_request_delete_idempotent() {
        let store = store_with("testfs", FilesystemPhase::Active).await;
        let first = store.request_delete("testfs").await.unwrap();
        let second = store.request_delete("testfs").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_request_delete_wrong_phase_rejected() {
        let store = FilesystemStore::new();
        store.create(spec("testfs")).await.unwrap();
        let err = store.request_delete("testfs").await;
        assert!(matches!(err, Err(ControlError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_request_delete_unknown_not_found() {
        let store = FilesystemStore::new();
        let err = store.request_delete("missing").await;
        assert!(matches!(err, Err(ControlError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_scale_replicas_bumps_generation() {
        let store = store_with("testfs", FilesystemPhase::Active).await;
        let generation = store.scale_replicas("testfs", 3).await.unwrap();
        assert_eq!(generation, 2);
        assert_eq!(store.get("testfs").await.unwrap().spec.metadata_replicas, 3);
    }

    #[tokio::test]
    async fn test_scale_replicas_same_value_no_bump() {
        let store = store_with("testfs", FilesystemPhase::Active).await;
        let generation = store.scale_replicas("testfs", 1).await.unwrap();
        assert_eq!(generation, 1);
    }

    #[tokio::test]
    async fn test_scale_replicas_wrong_phase_rejected() {
        let store = FilesystemStore::new();
        store.create(spec("testfs")).await.unwrap();
        let err = store.scale_replicas("testfs", 3).await;
        assert!(matches!(err, Err(ControlError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_scale_replicas_zero_rejected() {
        let store = store_with("testfs", FilesystemPhase::Active).await;
        let err = store.scale_replicas("testfs", 0).await;
        assert!(matches!(err, Err(ControlError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_update_status_with_current_generation() {
        let store = FilesystemStore::new();
        let record = store.create(spec("testfs")).await.unwrap();
        let mut status = record.status.clone();
        status.phase = FilesystemPhase::ProvisioningPools;
        store
            .update_status("testfs", record.generation, status)
            .await
            .unwrap();
        assert_eq!(
            store.get("testfs").await.unwrap().status.phase,
            FilesystemPhase::ProvisioningPools
        );
    }

    #[tokio::test]
    async fn test_update_status_stale_generation_rejected() {
        let store = store_with("testfs", FilesystemPhase::Active).await;
        // a spec change supersedes the in-flight pass
        store.scale_replicas("testfs", 3).await.unwrap();

        let mut status = store.get("testfs").await.unwrap().status.clone();
        status.phase = FilesystemPhase::Degraded;
        let err = store.update_status("testfs", 1, status).await;
        assert!(matches!(err, Err(ControlError::StaleGeneration { .. })));
        assert_eq!(
            store.get("testfs").await.unwrap().status.phase,
            FilesystemPhase::Active
        );
    }

    #[tokio::test]
    async fn test_entomb() {
        let store = store_with("testfs", FilesystemPhase::Deleted).await;
        let tombstone = store.entomb("testfs").await.unwrap();
        assert_eq!(tombstone.name, "testfs");
        assert!(store.get("testfs").await.is_none());
        assert!(store.tombstone("testfs").await.is_some());
        assert_eq!(store.count().await, 0);
    }

    #[tokio::test]
    async fn test_recreate_after_entomb() {
        let store = store_with("testfs", FilesystemPhase::Deleted).await;
        store.entomb("testfs").await.unwrap();
        let record = store.create(spec("testfs")).await.unwrap();
        assert_eq!(record.generation, 1);
        assert!(store.tombstone("testfs").await.is_some());
    }

    #[tokio::test]
    async fn test_gc_tombstones() {
        let store = store_with("testfs", FilesystemPhase::Deleted).await;
        store.entomb("testfs").await.unwrap();
        let deleted_at = store.tombstone("testfs").await.unwrap().deleted_at_secs;

        assert_eq!(store.gc_tombstones(3600, deleted_at + 10).await, 0);
        assert!(store.tombstone("testfs").await.is_some());

        assert_eq!(store.gc_tombstones(3600, deleted_at + 7200).await, 1);
        assert!(store.tombstone("testfs").await.is_none());
    }
}
