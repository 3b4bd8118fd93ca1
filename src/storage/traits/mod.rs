//! Capability interfaces a backing graph engine implements.
//!
//! An engine exposes itself as a [`GraphStore`] and opts into any subset of
//! the four capabilities by overriding the matching narrowing method:
//!
//! | Capability | Narrowing | Contract |
//! |------------|-----------|----------|
//! | [`QueryCapability`] | `as_queryable` | Lazy, single-pass query results |
//! | [`MutateCapability`] | `as_mutable` | All-or-nothing edge deltas |
//! | [`ImportCapability`] | `as_importable` | Bulk replace/append from bytes |
//! | [`MaintainCapability`] | `as_maintainable` | Purge and shutdown |
//!
//! Callers depend on the capability they need, never on a concrete engine.

mod import;
mod maintain;
mod mutate;
mod query;

pub use import::{ImportCapability, ImportMode, MEDIA_TYPE_JSON};
pub use maintain::MaintainCapability;
pub use mutate::{EdgeDelta, MutateCapability};
pub use query::{EdgeStream, QueryCapability, QueryLanguage, QueryResults, Row, RowStream};

use crate::{Error, Result};

/// A backing graph engine instance serving one repository.
///
/// # Implementor Notes
///
/// - Methods use `&self` to enable sharing via `Arc<dyn GraphStore>`
/// - Use interior mutability for mutable state
/// - Return `Some(self)` from each narrowing method the engine supports
pub trait GraphStore: Send + Sync {
    /// Diagnostic label of the repository this engine serves.
    fn label(&self) -> &str;

    /// Narrows to the query capability.
    fn as_queryable(&self) -> Option<&dyn QueryCapability> {
        None
    }

    /// Narrows to the mutate capability.
    fn as_mutable(&self) -> Option<&dyn MutateCapability> {
        None
    }

    /// Narrows to the import capability.
    fn as_importable(&self) -> Option<&dyn ImportCapability> {
        None
    }

    /// Narrows to the maintain capability.
    fn as_maintainable(&self) -> Option<&dyn MaintainCapability> {
        None
    }
}

/// Typed narrowing helpers that turn a missing capability into an error.
pub trait GraphStoreExt: GraphStore {
    /// Returns the query capability or [`Error::CapabilityUnsupported`].
    ///
    /// # Errors
    ///
    /// Returns an error if the engine does not support queries.
    fn queryable(&self) -> Result<&dyn QueryCapability> {
        self.as_queryable()
            .ok_or_else(|| unsupported("query", self.label()))
    }

    /// Returns the mutate capability or [`Error::CapabilityUnsupported`].
    ///
    /// # Errors
    ///
    /// Returns an error if the engine does not support mutation.
    fn mutable(&self) -> Result<&dyn MutateCapability> {
        self.as_mutable()
            .ok_or_else(|| unsupported("mutate", self.label()))
    }

    /// Returns the import capability or [`Error::CapabilityUnsupported`].
    ///
    /// # Errors
    ///
    /// Returns an error if the engine does not support imports.
    fn importable(&self) -> Result<&dyn ImportCapability> {
        self.as_importable()
            .ok_or_else(|| unsupported("import", self.label()))
    }

    /// Returns the maintain capability or [`Error::CapabilityUnsupported`].
    ///
    /// # Errors
    ///
    /// Returns an error if the engine does not support maintenance.
    fn maintainable(&self) -> Result<&dyn MaintainCapability> {
        self.as_maintainable()
            .ok_or_else(|| unsupported("maintain", self.label()))
    }
}

impl<T: GraphStore + ?Sized> GraphStoreExt for T {}

fn unsupported(capability: &'static str, label: &str) -> Error {
    Error::CapabilityUnsupported {
        capability,
        label: label.to_string(),
    }
}
