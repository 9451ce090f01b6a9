//! Error types for export coordination.

use thiserror::Error;

/// Errors returned by export publication and mount tracking.
#[derive(Debug, Error)]
pub enum ExportError {
    /// No export is published for this filesystem.
    #[error("no export published for filesystem {filesystem}")]
    NotExported {
        /// Filesystem name.
        filesystem: String,
    },
    /// The client has no registered mount.
    #[error("client {client} has no registered mount on filesystem {filesystem}")]
    NotRegistered {
        /// Filesystem name.
        filesystem: String,
        /// Client id.
        client: String,
    },
    /// Mounts are still registered.
    #[error("filesystem {filesystem} has {count} outstanding mount(s)")]
    MountsActive {
        /// Filesystem name.
        filesystem: String,
        /// Live registrations.
        count: usize,
    },
}
