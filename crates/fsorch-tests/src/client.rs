//! Fake filesystem client used in place of the external mount driver.
//!
//! The real client would mount the export over the wire. This one registers
//! against the export coordinator and stores file contents locally, which is
//! all a lifecycle scenario needs.

use std::collections::HashMap;
use thiserror::Error;

use fsorch_export::{EndpointInfo, ExportCoordinator};

/// Errors surfaced by the fake client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The filesystem is not mounted by this client.
    #[error("filesystem {0} is not mounted")]
    NotMounted(String),
    /// No file with this name was written.
    #[error("no such file: {0}")]
    NoSuchFile(String),
    /// The coordinator rejected the mount.
    #[error("mount rejected: {0}")]
    MountRejected(String),
}

/// Minimal client: mounts via the export coordinator, stores file contents.
pub struct FsClient {
    id: String,
    mounts: HashMap<String, EndpointInfo>,
    files: HashMap<(String, String), String>,
}

impl FsClient {
    /// A client with the given id.
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            mounts: HashMap::new(),
            files: HashMap::new(),
        }
    }

    /// Mount a filesystem through its published export.
    pub fn mount(
        &mut self,
        exports: &ExportCoordinator,
        filesystem: &str,
    ) -> Result<(), ClientError> {
        let endpoint = exports
            .endpoint(filesystem)
            .ok_or_else(|| ClientError::MountRejected(format!("no export for {}", filesystem)))?;
        exports
            .register_mount(filesystem, &self.id)
            .map_err(|e| ClientError::MountRejected(e.to_string()))?;
        self.mounts.insert(filesystem.to_string(), endpoint);
        Ok(())
    }

    /// Write a file on a mounted filesystem.
    pub fn write(
        &mut self,
        filesystem: &str,
        file: &str,
        contents: &str,
    ) -> Result<(), ClientError> {
        if !self.mounts.contains_key(filesystem) {
            return Err(ClientError::NotMounted(filesystem.to_string()));
        }
        self.files
            .insert((filesystem.to_string(), file.to_string()), contents.to_string());
        Ok(())
    }

    /// Read a file back from a mounted filesystem.
    pub fn read(&self, filesystem: &str, file: &str) -> Result<String, ClientError> {
        if !self.mounts.contains_key(filesystem) {
            return Err(ClientError::NotMounted(filesystem.to_string()));
        }
        self.files
            .get(&(filesystem.to_string(), file.to_string()))
            .cloned()
            .ok_or_else(|| ClientError::NoSuchFile(file.to_string()))
    }

    /// Unmount and release the registration.
    pub fn unmount(
        &mut self,
        exports: &ExportCoordinator,
        filesystem: &str,
    ) -> Result<(), ClientError> {
        if self.mounts.remove(filesystem).is_none() {
            return Err(ClientError::NotMounted(filesystem.to_string()));
        }
        exports
            .unmount(filesystem, &self.id)
            .map_err(|e| ClientError::MountRejected(e.to_string()))?;
        Ok(())
    }

    /// Whether this client currently mounts the filesystem.
    pub fn is_mounted(&self, filesystem: &str) -> bool {
        self.mounts.contains_key(filesystem)
    }

    /// The endpoint observed at mount time.
    pub fn mounted_endpoint(&self, filesystem: &str) -> Option<&EndpointInfo> {
        self.mounts.get(filesystem)
    }
}
