//! Storage layer.
//!
//! - **Traits**: capability interfaces a backing graph engine implements
//! - **Registry**: one repository handle per tenant and repository type
//! - **Memory**: in-memory engine with a minimal edge-pattern query language

// Gauges are reported as f64.
#![allow(clippy::cast_precision_loss)]
// Write guards span a whole delta.
#![allow(clippy::significant_drop_tightening)]

pub mod memory;
pub mod query;
pub mod registry;
pub mod traits;

pub use memory::{InMemoryGraphStore, InMemoryRepositoryBuilder};
pub use registry::{
    ConnectionLease, RepositoryBuilder, RepositoryDiagnostics, RepositoryHandle,
    RepositoryRegistry, RepositoryStatus,
};
pub use traits::{GraphStore, GraphStoreExt};
