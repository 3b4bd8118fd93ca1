//! Data models.

mod edge;
mod events;
mod repository;
mod transaction;

pub use edge::{Entity, GraphEdge, Term};
pub use events::{ActivitySubjects, EventMeta, TransactionEvent};
pub use repository::{RepositoryFlags, RepositoryKey, RepositoryType, TenantId};
pub use transaction::{
    Activity, ProvenanceRecord, Transaction, TransactionId, TransactionState, vocab,
};
