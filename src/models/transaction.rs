//! Provenance-tracked transactions.
//!
//! A [`Transaction`] collects three (possibly overlapping) edge sets:
//!
//! | Set | Meaning |
//! |-----|---------|
//! | `inserted` | Edges the transaction adds |
//! | `removed` | Edges the transaction deletes |
//! | `affected` | Every edge touched, including the two above |
//!
//! Lifecycle: `Open` → `Completed` | `Failed(reason)`. Only an open
//! transaction accepts new edges; terminal states never change again.

use super::edge::{GraphEdge, Term};
use super::repository::RepositoryKey;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Predicates used when rendering a transaction as provenance edges.
pub mod vocab {
    /// Namespace prefix for transaction resources.
    pub const TRANSACTION_NS: &str = "urn:tenantgraph:tx:";
    /// `rdf:type`.
    pub const TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
    /// Class of transaction resources.
    pub const TRANSACTION: &str = "urn:tenantgraph:Transaction";
    /// Status of the transaction.
    pub const STATUS: &str = "urn:tenantgraph:status";
    /// Creation timestamp (RFC 3339).
    pub const AT: &str = "urn:tenantgraph:at";
    /// Acting principal.
    pub const ACTOR: &str = "http://www.w3.org/ns/prov#wasAssociatedWith";
    /// Failure reason.
    pub const REASON: &str = "urn:tenantgraph:reason";
}

/// Globally unique, fixed-length (32 hex chars) transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// Length of the rendered identifier.
    pub const LEN: usize = 32;

    /// Generates a new time-ordered identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    /// Returns the identifier as a resource name.
    #[must_use]
    pub fn as_resource(&self) -> String {
        format!("{}{self}", vocab::TRANSACTION_NS)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Kind of change recorded against a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Activity {
    /// Edges were added.
    Inserted,
    /// Edges were removed.
    Removed,
    /// Edges were replaced.
    Updated,
}

impl Activity {
    /// Returns the activity as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Inserted => "INSERTED",
            Self::Removed => "REMOVED",
            Self::Updated => "UPDATED",
        }
    }

    /// Predicate linking a transaction to the subjects it touched.
    #[must_use]
    pub const fn predicate(&self) -> &'static str {
        match self {
            Self::Inserted => "urn:tenantgraph:inserted",
            Self::Removed => "urn:tenantgraph:removed",
            Self::Updated => "urn:tenantgraph:updated",
        }
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionState {
    /// Accepting edges.
    Open,
    /// Durably applied to its target repository.
    Completed,
    /// Not applied; carries a human-readable reason.
    Failed(String),
}

impl TransactionState {
    /// Returns true for `Completed` and `Failed`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Open)
    }

    /// Returns the state name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "running",
            Self::Completed => "success",
            Self::Failed(_) => "failure",
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One provenance entry: an activity recorded against a subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvenanceRecord {
    /// The activity.
    pub activity: Activity,
    /// The subject touched.
    pub subject: String,
    /// When the entry was recorded.
    pub recorded_at: DateTime<Utc>,
}

/// A provenance-tracked, atomically committed set of edge changes.
#[derive(Debug, Clone)]
pub struct Transaction {
    id: TransactionId,
    actor: String,
    created_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    inserted: BTreeSet<GraphEdge>,
    removed: BTreeSet<GraphEdge>,
    affected: BTreeSet<GraphEdge>,
    provenance: Vec<ProvenanceRecord>,
    state: TransactionState,
    target: Option<RepositoryKey>,
}

impl Transaction {
    /// Creates an open transaction on behalf of `actor`.
    #[must_use]
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            id: TransactionId::generate(),
            actor: actor.into(),
            created_at: Utc::now(),
            finished_at: None,
            inserted: BTreeSet::new(),
            removed: BTreeSet::new(),
            affected: BTreeSet::new(),
            provenance: Vec::new(),
            state: TransactionState::Open,
            target: None,
        }
    }

    /// The identifier.
    #[must_use]
    pub const fn id(&self) -> TransactionId {
        self.id
    }

    /// The acting principal.
    #[must_use]
    pub fn actor(&self) -> &str {
        &self.actor
    }

    /// Creation time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Time the transaction reached a terminal state.
    #[must_use]
    pub const fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> &TransactionState {
        &self.state
    }

    /// Returns true if the transaction still accepts edges.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self.state, TransactionState::Open)
    }

    /// Returns true once the transaction was applied.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self.state, TransactionState::Completed)
    }

    /// Returns the failure reason, if the transaction failed.
    #[must_use]
    pub fn failure_reason(&self) -> Option<&str> {
        match &self.state {
            TransactionState::Failed(reason) => Some(reason),
            _ => None,
        }
    }

    /// Repository the transaction was committed against.
    #[must_use]
    pub const fn target(&self) -> Option<&RepositoryKey> {
        self.target.as_ref()
    }

    /// Edges to insert.
    #[must_use]
    pub const fn inserted(&self) -> &BTreeSet<GraphEdge> {
        &self.inserted
    }

    /// Edges to remove.
    #[must_use]
    pub const fn removed(&self) -> &BTreeSet<GraphEdge> {
        &self.removed
    }

    /// Every edge touched by the transaction.
    #[must_use]
    pub const fn affected(&self) -> &BTreeSet<GraphEdge> {
        &self.affected
    }

    /// Provenance entries in recording order.
    #[must_use]
    pub fn provenance(&self) -> &[ProvenanceRecord] {
        &self.provenance
    }

    /// Returns true if the transaction changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.removed.is_empty()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(Error::TransactionNotOpen {
                id: self.id,
                state: self.state.to_string(),
            })
        }
    }

    /// Records edges to insert under `activity` (`Inserted` or `Updated`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransactionNotOpen`] on a terminal transaction, or
    /// [`Error::InvalidInput`] for a `Removed` activity.
    pub fn insert(
        &mut self,
        edges: impl IntoIterator<Item = GraphEdge>,
        activity: Activity,
    ) -> Result<&mut Self> {
        self.ensure_open()?;
        if activity == Activity::Removed {
            return Err(Error::InvalidInput(
                "inserted edges cannot be recorded as REMOVED".to_string(),
            ));
        }
        let edges: Vec<GraphEdge> = edges.into_iter().collect();
        self.record_activity(&edges, activity);
        for edge in edges {
            self.affected.insert(edge.clone());
            self.inserted.insert(edge);
        }
        Ok(self)
    }

    /// Records edges to remove under `activity` (`Removed` or `Updated`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransactionNotOpen`] on a terminal transaction, or
    /// [`Error::InvalidInput`] for an `Inserted` activity.
    pub fn remove(
        &mut self,
        edges: impl IntoIterator<Item = GraphEdge>,
        activity: Activity,
    ) -> Result<&mut Self> {
        self.ensure_open()?;
        if activity == Activity::Inserted {
            return Err(Error::InvalidInput(
                "removed edges cannot be recorded as INSERTED".to_string(),
            ));
        }
        let edges: Vec<GraphEdge> = edges.into_iter().collect();
        self.record_activity(&edges, activity);
        for edge in edges {
            self.affected.insert(edge.clone());
            self.removed.insert(edge);
        }
        Ok(self)
    }

    /// Records edges that were touched without classifying how.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransactionNotOpen`] on a terminal transaction.
    pub fn affect(&mut self, edges: impl IntoIterator<Item = GraphEdge>) -> Result<&mut Self> {
        self.ensure_open()?;
        self.affected.extend(edges);
        Ok(self)
    }

    fn record_activity(&mut self, edges: &[GraphEdge], activity: Activity) {
        let now = Utc::now();
        let mut seen = BTreeSet::new();
        for edge in edges {
            if seen.insert(edge.subject()) {
                self.provenance.push(ProvenanceRecord {
                    activity,
                    subject: edge.subject().to_string(),
                    recorded_at: now,
                });
            }
        }
    }

    /// Moves the edges and provenance of `other` into this transaction.
    ///
    /// `other` is treated as applied after `self`: an edge it removes is no
    /// longer inserted here, and an edge it inserts is no longer removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransactionNotOpen`] if either transaction is terminal.
    pub fn absorb(&mut self, other: Self) -> Result<()> {
        self.ensure_open()?;
        other.ensure_open()?;
        self.inserted.retain(|edge| !other.removed.contains(edge));
        self.removed.retain(|edge| !other.inserted.contains(edge));
        self.inserted.extend(other.inserted);
        self.removed.extend(other.removed);
        self.affected.extend(other.affected);
        self.provenance.extend(other.provenance);
        Ok(())
    }

    /// Returns inserted ∪ removed ∪ affected edges in `context`, with the
    /// context marker stripped.
    #[must_use]
    pub fn subset(&self, context: &str) -> BTreeSet<GraphEdge> {
        self.inserted
            .iter()
            .chain(&self.removed)
            .chain(&self.affected)
            .filter(|e| e.context() == Some(context))
            .map(GraphEdge::without_context)
            .collect()
    }

    /// Distinct subjects recorded under any of `activities`, in recording order.
    #[must_use]
    pub fn affected_subjects(&self, activities: &[Activity]) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.provenance
            .iter()
            .filter(|record| activities.contains(&record.activity))
            .filter(|record| seen.insert(record.subject.as_str()))
            .map(|record| record.subject.clone())
            .collect()
    }

    /// Renders the transaction as provenance edges.
    #[must_use]
    pub fn provenance_edges(&self) -> Vec<GraphEdge> {
        let subject = self.id.as_resource();
        let mut edges = vec![
            GraphEdge::new(&subject, vocab::TYPE, Term::iri(vocab::TRANSACTION)),
            GraphEdge::new(&subject, vocab::STATUS, Term::literal(self.state.as_str())),
            GraphEdge::new(
                &subject,
                vocab::AT,
                Term::literal(self.created_at.to_rfc3339()),
            ),
            GraphEdge::new(&subject, vocab::ACTOR, Term::literal(&self.actor)),
        ];
        if let Some(reason) = self.failure_reason() {
            edges.push(GraphEdge::new(&subject, vocab::REASON, Term::literal(reason)));
        }
        for record in &self.provenance {
            edges.push(GraphEdge::new(
                &subject,
                record.activity.predicate(),
                Term::iri(&record.subject),
            ));
        }
        edges
    }

    pub(crate) fn bind_target(&mut self, key: RepositoryKey) {
        self.target = Some(key);
    }

    pub(crate) fn mark_completed(&mut self) {
        if self.is_open() {
            self.state = TransactionState::Completed;
            self.finished_at = Some(Utc::now());
        }
    }

    pub(crate) fn mark_failed(&mut self, reason: impl Into<String>) {
        if self.is_open() {
            self.state = TransactionState::Failed(reason.into());
            self.finished_at = Some(Utc::now());
        }
    }
}
