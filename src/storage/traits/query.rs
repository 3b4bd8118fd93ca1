//! Query capability.

use crate::Result;
use crate::models::{GraphEdge, Term};
use std::collections::BTreeMap;

/// Query languages an engine may understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryLanguage {
    /// Single edge-pattern `SELECT`/`CONSTRUCT` language (see `storage::query`).
    EdgePattern,
    /// Any engine-specific language passed through verbatim.
    Native(&'static str),
}

/// One tabular result row: variable name to bound term.
pub type Row = BTreeMap<String, Term>;

/// Lazy, finite, single-pass sequence of rows.
pub type RowStream = Box<dyn Iterator<Item = Result<Row>> + Send>;

/// Lazy, finite, single-pass sequence of edges.
pub type EdgeStream = Box<dyn Iterator<Item = Result<GraphEdge>> + Send>;

/// Result of a query: tabular or graph-shaped.
pub enum QueryResults {
    /// Rows from a tabular query.
    Rows(RowStream),
    /// Edges from a graph-shaped query.
    Edges(EdgeStream),
}

impl QueryResults {
    /// Drains a tabular result.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::QueryExecutionError`] for a graph-shaped result,
    /// or the first row error.
    pub fn into_rows(self) -> Result<Vec<Row>> {
        match self {
            Self::Rows(rows) => rows.collect(),
            Self::Edges(_) => Err(crate::Error::QueryExecutionError(
                "expected tabular results, got edges".to_string(),
            )),
        }
    }

    /// Drains a graph-shaped result.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::QueryExecutionError`] for a tabular result,
    /// or the first edge error.
    pub fn into_edges(self) -> Result<Vec<GraphEdge>> {
        match self {
            Self::Edges(edges) => edges.collect(),
            Self::Rows(_) => Err(crate::Error::QueryExecutionError(
                "expected edges, got tabular results".to_string(),
            )),
        }
    }
}

impl std::fmt::Debug for QueryResults {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rows(_) => f.write_str("QueryResults::Rows(..)"),
            Self::Edges(_) => f.write_str("QueryResults::Edges(..)"),
        }
    }
}

/// Query execution.
pub trait QueryCapability: Send + Sync {
    /// Languages this engine accepts.
    fn languages(&self) -> &[QueryLanguage];

    /// Executes a query.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::QuerySyntaxError`] if the query cannot be
    /// parsed, or [`crate::Error::QueryExecutionError`] if it cannot run.
    fn query(&self, language: QueryLanguage, query: &str) -> Result<QueryResults>;
}
