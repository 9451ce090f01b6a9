//! Metadata service scheduling for orchestrated shared filesystems.
//!
//! Each filesystem is served by one Active metadata instance and zero or
//! more Standbys. This crate places instances on nodes through an injected
//! placement substrate, supervises their heartbeats, promotes a Standby
//! when the Active goes silent (guarded by a CAS lease token so a stale
//! pass cannot install a second Active), and drains instances on teardown.

pub mod error;
pub mod instance;
pub mod lease;
pub mod placement;
pub mod scheduler;

pub use error::SchedError;
pub use instance::{HealthStatus, InstanceId, MetadataInstance, MetadataRole, NodeId};
pub use lease::{ActiveLease, LeaseTable};
pub use placement::{PlacementSubstrate, RoundRobinPlacement};
pub use scheduler::{MetadataScheduler, SchedConfig, SchedulerEvent};
