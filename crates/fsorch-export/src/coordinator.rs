//! Export publication and mount tracking.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::credential::MountCredential;
use crate::error::ExportError;

/// Published connection info for a mountable filesystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointInfo {
    /// Filesystem the endpoint serves.
    pub filesystem: String,
    /// Address of the Active metadata instance.
    pub address: String,
    /// Secret clients present when mounting.
    pub credential: MountCredential,
    /// Bumped on every republish so clients can observe address changes.
    pub version: u64,
}

/// An outstanding client mount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountRegistration {
    /// Registration identity.
    pub id: Uuid,
    /// Filesystem mounted.
    pub filesystem: String,
    /// Client holding the mount.
    pub client: String,
    /// Seconds-since-epoch of the grant.
    pub registered_at_secs: u64,
}

struct ExportRecord {
    endpoint: EndpointInfo,
    mounts: HashMap<String, MountRegistration>,
}

/// Publishes mount endpoints and enforces the no-delete-while-mounted rule.
pub struct ExportCoordinator {
    exports: RwLock<HashMap<String, ExportRecord>>,
}

impl ExportCoordinator {
    /// Create an empty coordinator.
    pub fn new() -> Self {
        Self {
            exports: RwLock::new(HashMap::new()),
        }
    }

    /// Publish or refresh the endpoint for a filesystem.
    ///
    /// Re-entrant: republishing after a promotion updates the address and
    /// bumps the version; the credential and existing mounts are preserved.
    pub fn publish_export(&self, filesystem: &str, address: &str) -> EndpointInfo {
        let mut exports = self.exports.write().unwrap();
        match exports.get_mut(filesystem) {
            Some(record) => {
                record.endpoint.address = address.to_string();
                record.endpoint.version += 1;
                info!(
                    filesystem,
                    address,
                    version = record.endpoint.version,
                    "export republished"
                );
                record.endpoint.clone()
            }
            None => {
                let endpoint = EndpointInfo {
                    filesystem: filesystem.to_string(),
                    address: address.to_string(),
                    credential: MountCredential::generate(),
                    version: 1,
                };
                exports.insert(
                    filesystem.to_string(),
                    ExportRecord {
                        endpoint: endpoint.clone(),
                        mounts: HashMap::new(),
                    },
                );
                info!(filesystem, address, "export published");
                endpoint
            }
        }
    }

    /// The published endpoint, if any.
    pub fn endpoint(&self, filesystem: &str) -> Option<EndpointInfo> {
        let exports = self.exports.read().unwrap();
        exports.get(filesystem).map(|r| r.endpoint.clone())
    }

    /// Whether an export is published for the filesystem.
    pub fn is_exported(&self, filesystem: &str) -> bool {
        let exports = self.exports.read().unwrap();
        exports.contains_key(filesystem)
    }

    /// Grant a mount to a client. Idempotent per client.
    pub fn register_mount(
        &self,
        filesystem: &str,
        client: &str,
    ) -> Result<MountRegistration, ExportError> {
        let mut exports = self.exports.write().unwrap();
        let record = exports
            .get_mut(filesystem)
            .ok_or_else(|| ExportError::NotExported {
                filesystem: filesystem.to_string(),
            })?;
        if let Some(existing) = record.mounts.get(client) {
            return Ok(existing.clone());
        }
        let registration = MountRegistration {
            id: Uuid::new_v4(),
            filesystem: filesystem.to_string(),
            client: client.to_string(),
            registered_at_secs: now_secs(),
        };
        record
            .mounts
            .insert(client.to_string(), registration.clone());
        debug!(filesystem, client, "mount registered");
        Ok(registration)
    }

    /// Acknowledge a client unmount.
    pub fn unmount(&self, filesystem: &str, client: &str) -> Result<(), ExportError> {
        let mut exports = self.exports.write().unwrap();
        let record = exports
            .get_mut(filesystem)
            .ok_or_else(|| ExportError::NotExported {
                filesystem: filesystem.to_string(),
            })?;
        if record.mounts.remove(client).is_none() {
            return Err(ExportError::NotRegistered {
                filesystem: filesystem.to_string(),
                client: client.to_string(),
            });
        }
        debug!(filesystem, client, "mount released");
        Ok(())
    }

    /// True iff no live mount registration exists.
    pub fn can_delete(&self, filesystem: &str) -> bool {
        let exports = self.exports.read().unwrap();
        exports
            .get(filesystem)
            .map(|r| r.mounts.is_empty())
            .unwrap_or(true)
    }

    /// Number of live registrations for a filesystem.
    pub fn mount_count(&self, filesystem: &str) -> usize {
        let exports = self.exports.read().unwrap();
        exports.get(filesystem).map(|r| r.mounts.len()).unwrap_or(0)
    }

    /// All live registrations for a filesystem.
    pub fn mounts(&self, filesystem: &str) -> Vec<MountRegistration> {
        let exports = self.exports.read().unwrap();
        exports
            .get(filesystem)
            .map(|r| r.mounts.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Remove the endpoint. Refuses while registrations remain; removing an
    /// already-withdrawn export is not an error.
    pub fn withdraw_export(&self, filesystem: &str) -> Result<(), ExportError> {
        let mut exports = self.exports.write().unwrap();
        match exports.get(filesystem) {
            None => Ok(()),
            Some(record) if !record.mounts.is_empty() => Err(ExportError::MountsActive {
                filesystem: filesystem.to_string(),
                count: record.mounts.len(),
            }),
            Some(_) => {
                exports.remove(filesystem);
                info!(filesystem, "export withdrawn");
                Ok(())
            }
        }
    }

    /// Number of published exports.
    pub fn count(&self) -> usize {
        let exports = self.exports.read().unwrap();
        exports.len()
    }
}

impl Default for ExportCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
