//! Services.
//!
//! The interceptor guards every operation; the transaction manager commits
//! through the repository registry; entity and admin services are the domain
//! operations built on both. [`GraphServices`] wires all of them from a
//! [`GraphConfig`](crate::GraphConfig).

mod admin;
mod container;
mod entities;
mod interceptor;
mod transactions;

pub use admin::AdminService;
pub use container::GraphServices;
pub use entities::EntityService;
pub use interceptor::{DeclaredOperation, Interceptor, Operation, OperationMetadata};
pub use transactions::{CommitFailure, TransactionManager};
