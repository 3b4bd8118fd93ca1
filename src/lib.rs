//! # Tenantgraph
//!
//! Multi-tenant graph repository core.
//!
//! Every tenant ("application") owns an isolated set of graph repositories, one
//! per [`RepositoryType`]. Callers mutate and query them through declared
//! operations that are routed, authorized, and recorded as provenance-tracked
//! [`Transaction`]s.
//!
//! ## Architecture
//!
//! - **Capability interfaces** ([`storage::traits`]): query, mutate, import, and
//!   maintain contracts a backing engine implements in any combination
//! - **Repository registry** ([`RepositoryRegistry`]): one labeled handle per
//!   (tenant, type) pair with connection accounting
//! - **Transaction manager** ([`TransactionManager`]): OPEN → COMPLETED | FAILED
//!   state machine with all-or-nothing commits
//! - **Session context** ([`SessionContext`]): per-request identity and routing target
//! - **Interceptor** ([`Interceptor`]): the single policy-enforcement point
//! - **Services** ([`GraphServices`]): everything above wired from one [`GraphConfig`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use tenantgraph::{
//!     Authority, GraphConfig, GraphEdge, GraphServices, InMemoryRepositoryBuilder, Principal,
//!     SessionContext, TenantId, Term,
//! };
//!
//! let config = GraphConfig::load_default();
//! let services = GraphServices::from_config(&config, Arc::new(InMemoryRepositoryBuilder::new()));
//! let entities = services.entities();
//! let mut ctx = SessionContext::new(
//!     Principal::new("alice", [Authority::User]),
//!     TenantId::new("acme"),
//! );
//! let tx = entities.insert_edges(
//!     &mut ctx,
//!     vec![GraphEdge::new("urn:s1", "urn:p1", Term::iri("urn:o1"))],
//! )?;
//! assert!(tx.is_completed());
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod config;
pub mod context;
pub mod models;
pub mod observability;
pub mod security;
pub mod services;
pub mod storage;

pub use config::GraphConfig;
pub use context::{Environment, RequestDetails, SessionContext};
pub use models::{
    Activity, Entity, GraphEdge, RepositoryFlags, RepositoryKey, RepositoryType, Term, TenantId,
    Transaction, TransactionEvent, TransactionId, TransactionState,
};
pub use security::{Authority, Principal};
pub use services::{
    AdminService, CommitFailure, DeclaredOperation, EntityService, GraphServices, Interceptor,
    Operation, OperationMetadata, TransactionManager,
};
pub use storage::{
    ConnectionLease, GraphStore, InMemoryGraphStore, InMemoryRepositoryBuilder, RepositoryBuilder,
    RepositoryHandle, RepositoryRegistry,
};

/// Error type for tenantgraph operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `MissingRepositoryDeclaration` | An operation declares no target repository type |
/// | `InsufficientAuthority` | Caller's granted authorities do not reach the declared minimum |
/// | `Unauthorized` | An environment that never passed the interceptor reaches a repository |
/// | `RepositoryBuildFailure` | The repository builder cannot materialize a backend |
/// | `RepositoryUnavailable` | Checkout on a handle that was shut down |
/// | `TransactionNotOpen` | Mutating or committing a COMPLETED/FAILED transaction |
/// | `DuplicateCommit` | A transaction identifier is committed a second time |
/// | `CommitFailed` | Applying a transaction's delta failed |
/// | `QuerySyntaxError` / `QueryExecutionError` | Query capability rejects or fails a query |
/// | `UnsupportedMediaType` / `MalformedPayload` | Import capability rejects a payload |
/// | `CapabilityUnsupported` | The engine behind a repository lacks the needed capability |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - An edge carries an empty subject or predicate
    /// - An activity kind does not match the recorded intent
    /// - A tenant identifier is empty
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed for an internal reason (lock poisoning, config I/O).
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// An operation was declared without a target repository type.
    ///
    /// This is a programming defect, never a runtime or user condition.
    #[error("operation '{operation}' declares no target repository type")]
    MissingRepositoryDeclaration {
        /// Name of the offending operation.
        operation: String,
    },

    /// The caller does not hold the required minimum authority.
    #[error("operation '{operation}' requires authority {required}, caller holds [{granted}]")]
    InsufficientAuthority {
        /// Name of the rejected operation.
        operation: String,
        /// The declared minimum authority.
        required: security::Authority,
        /// The caller's granted authorities, comma separated.
        granted: String,
    },

    /// The environment reached a repository without being authorized.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A repository could not be built.
    #[error("failed to build repository '{label}': {cause}")]
    RepositoryBuildFailure {
        /// Label of the repository.
        label: String,
        /// The underlying cause.
        cause: String,
    },

    /// A repository handle was shut down.
    #[error("repository '{label}' is unavailable")]
    RepositoryUnavailable {
        /// Label of the repository.
        label: String,
    },

    /// A transaction in a terminal state was mutated or committed.
    #[error("transaction {id} is not open (state: {state})")]
    TransactionNotOpen {
        /// The transaction identifier.
        id: models::TransactionId,
        /// The current state.
        state: String,
    },

    /// A transaction identifier was committed more than once.
    #[error("transaction {id} was already committed")]
    DuplicateCommit {
        /// The transaction identifier.
        id: models::TransactionId,
    },

    /// Applying a transaction failed; the transaction is FAILED.
    #[error("commit of transaction {id} failed: {reason}")]
    CommitFailed {
        /// The transaction identifier.
        id: models::TransactionId,
        /// Human-readable reason.
        reason: String,
    },

    /// A query could not be parsed.
    #[error("query syntax error: {0}")]
    QuerySyntaxError(String),

    /// A query was parsed but could not be executed.
    #[error("query execution error: {0}")]
    QueryExecutionError(String),

    /// An import payload carried an unsupported media type.
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// An import payload could not be decoded.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The engine behind a repository does not provide a capability.
    #[error("repository '{label}' does not support the {capability} capability")]
    CapabilityUnsupported {
        /// The missing capability.
        capability: &'static str,
        /// Label of the repository.
        label: String,
    },
}

/// Result type alias for tenantgraph operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Maps a poisoned lock into an [`Error::OperationFailed`].
pub(crate) fn lock_poisoned(operation: &str) -> Error {
    Error::OperationFailed {
        operation: operation.to_string(),
        cause: "Lock poisoned".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("empty subject".to_string());
        assert_eq!(err.to_string(), "invalid input: empty subject");

        let err = Error::MissingRepositoryDeclaration {
            operation: "read_entity".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "operation 'read_entity' declares no target repository type"
        );

        let err = Error::InsufficientAuthority {
            operation: "reset".to_string(),
            required: security::Authority::Application,
            granted: "USER".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "operation 'reset' requires authority APPLICATION, caller holds [USER]"
        );
    }

    #[test]
    fn test_lock_poisoned_names_operation() {
        let err = lock_poisoned("resolve");
        assert!(err.to_string().contains("'resolve'"));
    }
}
