//! Export publication for orchestrated shared filesystems.
//!
//! Once a filesystem is serving, its mount endpoint and credential are
//! published here. Clients register mounts against the export; a filesystem
//! cannot be deleted while any registration is live.

pub mod coordinator;
pub mod credential;
pub mod error;

pub use coordinator::{EndpointInfo, ExportCoordinator, MountRegistration};
pub use credential::MountCredential;
pub use error::ExportError;
