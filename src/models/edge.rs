//! Graph edges and entity views.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Object position of a [`GraphEdge`]: either a resource or a literal value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Term {
    /// A resource identifier (IRI, URN, blank node label).
    Resource(String),
    /// A literal value.
    Literal(String),
}

impl Term {
    /// Creates a resource term.
    #[must_use]
    pub fn iri(value: impl Into<String>) -> Self {
        Self::Resource(value.into())
    }

    /// Creates a literal term.
    #[must_use]
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }

    /// Returns the raw string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Resource(v) | Self::Literal(v) => v,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resource(v) => write!(f, "<{v}>"),
            Self::Literal(v) => write!(f, "\"{v}\""),
        }
    }
}

/// A subject-predicate-object tuple with an optional named context.
///
/// Edges are immutable values; equality covers all four fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GraphEdge {
    subject: String,
    predicate: String,
    object: Term,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    context: Option<String>,
}

impl GraphEdge {
    /// Creates an edge in the default context.
    #[must_use]
    pub fn new(subject: impl Into<String>, predicate: impl Into<String>, object: Term) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object,
            context: None,
        }
    }

    /// Returns a copy of this edge placed in a named context.
    #[must_use]
    pub fn in_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Returns a copy of this edge with its context marker removed.
    #[must_use]
    pub fn without_context(&self) -> Self {
        Self {
            subject: self.subject.clone(),
            predicate: self.predicate.clone(),
            object: self.object.clone(),
            context: None,
        }
    }

    /// The subject resource.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// The predicate.
    #[must_use]
    pub fn predicate(&self) -> &str {
        &self.predicate
    }

    /// The object term.
    #[must_use]
    pub const fn object(&self) -> &Term {
        &self.object
    }

    /// The named context, if any.
    #[must_use]
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Returns an error message if the edge cannot be stored.
    #[must_use]
    pub fn validation_error(&self) -> Option<String> {
        if self.subject.trim().is_empty() {
            return Some(format!("edge {self} has an empty subject"));
        }
        if self.predicate.trim().is_empty() {
            return Some(format!("edge {self} has an empty predicate"));
        }
        None
    }
}

impl fmt::Display for GraphEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}> <{}> {}", self.subject, self.predicate, self.object)?;
        if let Some(ref ctx) = self.context {
            write!(f, " <{ctx}>")?;
        }
        Ok(())
    }
}

/// The edges sharing one subject, as observed by a read.
///
/// Never persisted; it is a view over the store at read time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    /// The shared subject.
    pub subject: String,
    /// Edges with that subject.
    pub edges: BTreeSet<GraphEdge>,
}

impl Entity {
    /// Builds an entity view from edges, keeping only those with `subject`.
    #[must_use]
    pub fn from_edges(
        subject: impl Into<String>,
        edges: impl IntoIterator<Item = GraphEdge>,
    ) -> Self {
        let subject = subject.into();
        let edges = edges
            .into_iter()
            .filter(|e| e.subject() == subject)
            .collect();
        Self { subject, edges }
    }

    /// Returns true if no edges were observed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Returns the objects of all edges with the given predicate.
    #[must_use]
    pub fn values(&self, predicate: &str) -> Vec<&Term> {
        self.edges
            .iter()
            .filter(|e| e.predicate() == predicate)
            .map(GraphEdge::object)
            .collect()
    }
}
