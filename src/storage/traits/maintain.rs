//! Maintain capability.

use crate::Result;

/// Administrative operations on one repository.
pub trait MaintainCapability: Send + Sync {
    /// Removes all content; the engine stays usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is shut down or the purge fails.
    fn purge(&self) -> Result<()>;

    /// Releases engine resources; later calls fail.
    ///
    /// Calling it twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if releasing resources fails.
    fn shutdown(&self) -> Result<()>;

    /// Returns true once [`shutdown`](Self::shutdown) ran.
    fn is_shut_down(&self) -> bool;

    /// Number of stored edges.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is shut down.
    fn edge_count(&self) -> Result<usize>;
}
