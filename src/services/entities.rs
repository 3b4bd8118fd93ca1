//! Entity operations on a tenant's ENTITIES repository.
//!
//! Every method routes through the [`Interceptor`] with a fixed declaration:
//!
//! | Operation | Repository | Minimum authority |
//! |-----------|------------|-------------------|
//! | `read_entity`, `query` | ENTITIES | READER |
//! | `insert_edges`, `remove_edges`, `update_edges` | ENTITIES | USER |
//! | provenance write | TRANSACTIONS | USER |
//!
//! Each completed write is followed by a second commit that records the
//! transaction's provenance edges in the tenant's TRANSACTIONS repository.
//! That commit publishes no event. Its failure never turns the completed
//! write into an error: it is logged and counted in
//! `provenance_write_failed_total`.

use super::interceptor::{Interceptor, OperationMetadata};
use super::transactions::TransactionManager;
use crate::context::SessionContext;
use crate::models::{Activity, Entity, GraphEdge, RepositoryType, Transaction};
use crate::security::Authority;
use crate::storage::traits::{GraphStoreExt, QueryLanguage, QueryResults};
use crate::{Error, Result};
use std::sync::Arc;
use tracing::instrument;

const READ: OperationMetadata = OperationMetadata::new(RepositoryType::Entities, Authority::Reader);
const WRITE: OperationMetadata = OperationMetadata::new(RepositoryType::Entities, Authority::User);
const PROVENANCE: OperationMetadata =
    OperationMetadata::new(RepositoryType::Transactions, Authority::User);

/// Reads and writes entities of the caller's tenant.
#[derive(Debug, Clone)]
pub struct EntityService {
    interceptor: Interceptor,
    transactions: Arc<TransactionManager>,
}

impl EntityService {
    /// Creates the service.
    #[must_use]
    pub const fn new(interceptor: Interceptor, transactions: Arc<TransactionManager>) -> Self {
        Self {
            interceptor,
            transactions,
        }
    }

    /// Returns every edge whose subject is `subject`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InsufficientAuthority`] for callers below READER, or
    /// an error from the repository.
    #[instrument(skip(self, ctx), fields(operation = "read_entity"))]
    pub fn read_entity(&self, ctx: &mut SessionContext, subject: &str) -> Result<Entity> {
        if subject.is_empty() || subject.contains('>') {
            return Err(Error::InvalidInput(format!("invalid subject '{subject}'")));
        }
        let registry = self.transactions.registry();
        self.interceptor.call(ctx, "read_entity", READ, |ctx| {
            let handle = registry.resolve(ctx.environment())?;
            let lease = handle.checkout()?;
            let edges = lease
                .store()
                .queryable()?
                .query(
                    QueryLanguage::EdgePattern,
                    &format!("CONSTRUCT WHERE <{subject}> ?p ?o"),
                )?
                .into_edges()?;
            Ok(Entity::from_edges(subject, edges))
        })
    }

    /// Runs a query against the caller's ENTITIES repository.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QuerySyntaxError`] or [`Error::QueryExecutionError`]
    /// from the engine, or an authorization error.
    #[instrument(skip(self, ctx, query), fields(operation = "query"))]
    pub fn query(
        &self,
        ctx: &mut SessionContext,
        language: QueryLanguage,
        query: &str,
    ) -> Result<QueryResults> {
        let registry = self.transactions.registry();
        self.interceptor.call(ctx, "query", READ, |ctx| {
            let handle = registry.resolve(ctx.environment())?;
            let lease = handle.checkout()?;
            lease.store().queryable()?.query(language, query)
        })
    }

    /// Inserts edges in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommitFailed`] if the delta was not applied, or an
    /// authorization error.
    pub fn insert_edges(
        &self,
        ctx: &mut SessionContext,
        edges: impl IntoIterator<Item = GraphEdge>,
    ) -> Result<Transaction> {
        let edges: Vec<GraphEdge> = edges.into_iter().collect();
        self.write(ctx, "insert_edges", |tx| tx.insert(edges, Activity::Inserted).map(|_| ()))
    }

    /// Removes edges in one transaction.
    ///
    /// # Errors
    ///
    /// See [`insert_edges`](Self::insert_edges).
    pub fn remove_edges(
        &self,
        ctx: &mut SessionContext,
        edges: impl IntoIterator<Item = GraphEdge>,
    ) -> Result<Transaction> {
        let edges: Vec<GraphEdge> = edges.into_iter().collect();
        self.write(ctx, "remove_edges", |tx| tx.remove(edges, Activity::Removed).map(|_| ()))
    }

    /// Replaces `removed` with `inserted` in one transaction.
    ///
    /// # Errors
    ///
    /// See [`insert_edges`](Self::insert_edges).
    pub fn update_edges(
        &self,
        ctx: &mut SessionContext,
        removed: impl IntoIterator<Item = GraphEdge>,
        inserted: impl IntoIterator<Item = GraphEdge>,
    ) -> Result<Transaction> {
        let removed: Vec<GraphEdge> = removed.into_iter().collect();
        let inserted: Vec<GraphEdge> = inserted.into_iter().collect();
        self.write(ctx, "update_edges", |tx| {
            tx.remove(removed, Activity::Updated)?;
            tx.insert(inserted, Activity::Updated)?;
            Ok(())
        })
    }

    #[instrument(skip(self, ctx, record))]
    fn write(
        &self,
        ctx: &mut SessionContext,
        operation: &'static str,
        record: impl FnOnce(&mut Transaction) -> Result<()>,
    ) -> Result<Transaction> {
        let manager = &self.transactions;
        let committed = self.interceptor.call(ctx, operation, WRITE, |ctx| {
            let mut transaction = manager.begin(ctx.principal().name());
            record(&mut transaction)?;
            manager
                .commit_correlated(
                    transaction,
                    ctx.environment(),
                    ctx.request_id().map(str::to_string),
                )
                .map_err(Error::from)
        })?;
        if let Err(e) = self.record_provenance(ctx, &committed) {
            metrics::counter!("provenance_write_failed_total").increment(1);
            tracing::warn!(
                transaction_id = %committed.id(),
                error = %e,
                "Provenance write failed"
            );
        }
        Ok(committed)
    }

    fn record_provenance(&self, ctx: &mut SessionContext, committed: &Transaction) -> Result<()> {
        let manager = &self.transactions;
        self.interceptor.call(ctx, "record_provenance", PROVENANCE, |ctx| {
            let mut provenance = manager.begin(ctx.principal().name());
            provenance.insert(committed.provenance_edges(), Activity::Inserted)?;
            manager
                .commit_unpublished(provenance, ctx.environment())
                .map(|_| ())
                .map_err(Error::from)
        })
    }
}
