//! Transaction manager.
//!
//! Creates transactions, records edge intents on them, and commits them
//! against the repository an authorized [`Environment`] resolves to.
//!
//! # Commit
//!
//! | Outcome | Transaction state | Store |
//! |---------|-------------------|-------|
//! | Delta applied | `Completed` | Whole delta visible |
//! | Build, checkout or apply failed | `Failed(reason)` | Untouched |
//! | Not open, duplicate id, or unauthorized environment | unchanged | Untouched |
//!
//! Each transaction id commits at most once. Ids are remembered in a bounded
//! ledger, and a second commit of the same id (a clone, or a concurrent call)
//! is rejected with [`Error::DuplicateCommit`].
//!
//! A [`TransactionEvent`] is published on the event bus after the lease is
//! released, never inside the commit.

use crate::config::TransactionConfig;
use crate::context::Environment;
use crate::models::{Activity, GraphEdge, Transaction, TransactionEvent, TransactionId};
use crate::observability::EventBus;
use crate::storage::RepositoryRegistry;
use crate::storage::traits::{EdgeDelta, GraphStoreExt};
use crate::{Error, Result, lock_poisoned};
use lru::LruCache;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use tracing::instrument;

/// A commit that did not complete.
///
/// Carries the transaction back to the caller: `Failed` if the commit was
/// attempted, unchanged if it was rejected up front. Batch commits also hand
/// back the transactions committed before the failure and the ones never
/// attempted.
#[derive(Debug, thiserror::Error)]
#[error("transaction {id} did not commit: {cause}", id = .transaction.id())]
pub struct CommitFailure {
    transaction: Box<Transaction>,
    #[source]
    cause: Error,
    completed: Vec<Transaction>,
    pending: Vec<Transaction>,
}

impl CommitFailure {
    fn new(transaction: Transaction, cause: Error) -> Self {
        Self {
            transaction: Box::new(transaction),
            cause,
            completed: Vec::new(),
            pending: Vec::new(),
        }
    }

    /// The transaction that did not commit.
    #[must_use]
    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    /// Consumes the failure, returning the transaction.
    #[must_use]
    pub fn into_transaction(self) -> Transaction {
        *self.transaction
    }

    /// The underlying error.
    #[must_use]
    pub const fn cause(&self) -> &Error {
        &self.cause
    }

    /// Transactions of a batch that completed before the failure.
    #[must_use]
    pub fn completed(&self) -> &[Transaction] {
        &self.completed
    }

    /// Transactions of a batch that were never attempted; still open.
    #[must_use]
    pub fn pending(&self) -> &[Transaction] {
        &self.pending
    }

    /// Consumes the failure, returning the never-attempted transactions.
    #[must_use]
    pub fn into_pending(self) -> Vec<Transaction> {
        self.pending
    }
}

impl From<CommitFailure> for Error {
    fn from(failure: CommitFailure) -> Self {
        match failure.cause {
            e @ (Self::TransactionNotOpen { .. } | Self::DuplicateCommit { .. }) => e,
            cause => Self::CommitFailed {
                id: failure.transaction.id(),
                reason: failure
                    .transaction
                    .failure_reason()
                    .map_or_else(|| cause.to_string(), str::to_string),
            },
        }
    }
}

struct Ledger {
    committed: LruCache<TransactionId, ()>,
    in_flight: HashSet<TransactionId>,
}

/// Removes the id from the in-flight set on every exit path.
struct Claim<'a> {
    manager: &'a TransactionManager,
    id: TransactionId,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if let Ok(mut ledger) = self.manager.ledger.lock() {
            ledger.in_flight.remove(&self.id);
            ledger.committed.put(self.id, ());
        }
    }
}

/// Creates, mutates and finalizes transactions.
pub struct TransactionManager {
    registry: Arc<RepositoryRegistry>,
    ledger: Mutex<Ledger>,
    events: EventBus,
}

impl fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionManager")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl TransactionManager {
    /// Creates a manager committing through `registry`.
    ///
    /// Events go to a private bus until [`with_event_bus`](Self::with_event_bus)
    /// supplies a shared one.
    #[must_use]
    pub fn new(registry: Arc<RepositoryRegistry>, config: TransactionConfig) -> Self {
        let capacity = NonZeroUsize::new(config.ledger_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            registry,
            ledger: Mutex::new(Ledger {
                committed: LruCache::new(capacity),
                in_flight: HashSet::new(),
            }),
            events: EventBus::default(),
        }
    }

    /// Publishes completion events on `events`.
    #[must_use]
    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// The registry commits go through.
    #[must_use]
    pub const fn registry(&self) -> &Arc<RepositoryRegistry> {
        &self.registry
    }

    /// Starts an open transaction for `actor`.
    #[must_use]
    pub fn begin(&self, actor: impl Into<String>) -> Transaction {
        let transaction = Transaction::new(actor);
        tracing::trace!(transaction_id = %transaction.id(), "Began transaction");
        transaction
    }

    /// Records edges to insert.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransactionNotOpen`] if the transaction is terminal.
    pub fn record_insert(
        &self,
        transaction: &mut Transaction,
        edges: impl IntoIterator<Item = GraphEdge>,
        activity: Activity,
    ) -> Result<()> {
        transaction.insert(edges, activity).map(|_| ())
    }

    /// Records edges to remove.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransactionNotOpen`] if the transaction is terminal.
    pub fn record_remove(
        &self,
        transaction: &mut Transaction,
        edges: impl IntoIterator<Item = GraphEdge>,
        activity: Activity,
    ) -> Result<()> {
        transaction.remove(edges, activity).map(|_| ())
    }

    /// Records edges touched without classifying how.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransactionNotOpen`] if the transaction is terminal.
    pub fn record_affected(
        &self,
        transaction: &mut Transaction,
        edges: impl IntoIterator<Item = GraphEdge>,
    ) -> Result<()> {
        transaction.affect(edges).map(|_| ())
    }

    /// Edges of `transaction` in `context`, context marker stripped.
    #[must_use]
    pub fn read_subset(&self, transaction: &Transaction, context: &str) -> BTreeSet<GraphEdge> {
        transaction.subset(context)
    }

    /// Commits `transaction` against the environment's repository.
    ///
    /// # Errors
    ///
    /// Returns a [`CommitFailure`] carrying the transaction; see the module
    /// docs for which state it is left in.
    pub fn commit(
        &self,
        transaction: Transaction,
        environment: &Environment,
    ) -> std::result::Result<Transaction, CommitFailure> {
        self.commit_correlated(transaction, environment, None)
    }

    /// Like [`commit`](Self::commit), tagging the completion event with a
    /// correlation id.
    ///
    /// # Errors
    ///
    /// See [`commit`](Self::commit).
    #[instrument(
        skip(self, transaction, environment, correlation_id),
        fields(transaction_id = %transaction.id(), tenant = %environment.tenant())
    )]
    pub fn commit_correlated(
        &self,
        transaction: Transaction,
        environment: &Environment,
        correlation_id: Option<String>,
    ) -> std::result::Result<Transaction, CommitFailure> {
        let transaction = self.commit_unpublished(transaction, environment)?;
        if let Some(event) = TransactionEvent::from_transaction(&transaction, correlation_id) {
            self.events.publish(event);
        }
        Ok(transaction)
    }

    /// Commits without publishing a completion event.
    ///
    /// Used for bookkeeping writes that are not data changes, such as
    /// provenance records.
    pub(crate) fn commit_unpublished(
        &self,
        mut transaction: Transaction,
        environment: &Environment,
    ) -> std::result::Result<Transaction, CommitFailure> {
        if !transaction.is_open() {
            let cause = Error::TransactionNotOpen {
                id: transaction.id(),
                state: transaction.state().to_string(),
            };
            return Err(CommitFailure::new(transaction, cause));
        }
        let key = match environment.repository_key() {
            Ok(key) => key,
            Err(e) => return Err(CommitFailure::new(transaction, e)),
        };
        let claim = match self.claim(transaction.id()) {
            Ok(claim) => claim,
            Err(e) => return Err(CommitFailure::new(transaction, e)),
        };

        transaction.bind_target(key);
        match self.apply(&transaction, environment) {
            Ok(()) => transaction.mark_completed(),
            Err(e) => transaction.mark_failed(e.to_string()),
        }
        drop(claim);

        if let Some(reason) = transaction.failure_reason() {
            metrics::counter!("transactions_failed_total").increment(1);
            tracing::warn!(reason, "Transaction failed");
            let cause = Error::CommitFailed {
                id: transaction.id(),
                reason: reason.to_string(),
            };
            return Err(CommitFailure::new(transaction, cause));
        }

        metrics::counter!("transactions_committed_total").increment(1);
        tracing::info!(
            inserted = transaction.inserted().len(),
            removed = transaction.removed().len(),
            "Transaction committed"
        );
        Ok(transaction)
    }

    /// Commits several transactions in order, stopping at the first failure.
    ///
    /// With `merge` the transactions are folded into the first one and
    /// committed as a single atomic delta under its id.
    ///
    /// # Errors
    ///
    /// Returns a [`CommitFailure`] for the first transaction that did not
    /// commit, carrying the earlier completed and the later untouched ones.
    pub fn commit_all(
        &self,
        transactions: Vec<Transaction>,
        environment: &Environment,
        merge: bool,
    ) -> std::result::Result<Vec<Transaction>, CommitFailure> {
        if merge {
            return self.commit_merged(transactions, environment);
        }

        let mut completed = Vec::with_capacity(transactions.len());
        let mut remaining = transactions.into_iter();
        while let Some(transaction) = remaining.next() {
            match self.commit(transaction, environment) {
                Ok(done) => completed.push(done),
                Err(mut failure) => {
                    failure.completed = completed;
                    failure.pending = remaining.collect();
                    return Err(failure);
                },
            }
        }
        Ok(completed)
    }

    fn commit_merged(
        &self,
        transactions: Vec<Transaction>,
        environment: &Environment,
    ) -> std::result::Result<Vec<Transaction>, CommitFailure> {
        if let Some(position) = transactions.iter().position(|t| !t.is_open()) {
            let mut transactions = transactions;
            let closed = transactions.remove(position);
            let cause = Error::TransactionNotOpen {
                id: closed.id(),
                state: closed.state().to_string(),
            };
            let mut failure = CommitFailure::new(closed, cause);
            failure.pending = transactions;
            return Err(failure);
        }

        let mut batch = transactions.into_iter();
        let Some(mut merged) = batch.next() else {
            return Ok(Vec::new());
        };
        for transaction in batch {
            if let Err(e) = merged.absorb(transaction) {
                return Err(CommitFailure::new(merged, e));
            }
        }
        self.commit(merged, environment).map(|done| vec![done])
    }

    fn claim(&self, id: TransactionId) -> Result<Claim<'_>> {
        let mut ledger = self.ledger.lock().map_err(|_| lock_poisoned("commit"))?;
        if ledger.committed.contains(&id) || !ledger.in_flight.insert(id) {
            return Err(Error::DuplicateCommit { id });
        }
        Ok(Claim { manager: self, id })
    }

    fn apply(&self, transaction: &Transaction, environment: &Environment) -> Result<()> {
        let handle = self.registry.resolve(environment)?;
        let lease = handle.checkout()?;
        lease.store().mutable()?.apply(EdgeDelta::of(transaction))
    }
}
