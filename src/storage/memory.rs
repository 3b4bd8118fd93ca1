//! In-memory graph engine.
//!
//! Implements all four capabilities over a `RwLock<BTreeSet<GraphEdge>>`.
//! Writers take the lock once per delta, so readers see either the whole
//! delta or none of it. Content is not persisted between runs.
//!
//! # Example
//!
//! ```rust,ignore
//! use tenantgraph::storage::InMemoryGraphStore;
//! use tenantgraph::storage::traits::{GraphStore, QueryLanguage};
//!
//! let store = InMemoryGraphStore::new("entities_acme");
//! let rows = store
//!     .as_queryable()
//!     .unwrap()
//!     .query(QueryLanguage::EdgePattern, "SELECT DISTINCT ?s WHERE ?s ?p ?o")?
//!     .into_rows()?;
//! ```

use super::query::{self, Projection};
use super::registry::RepositoryBuilder;
use super::traits::{
    EdgeDelta, GraphStore, ImportCapability, ImportMode, MEDIA_TYPE_JSON, MaintainCapability,
    MutateCapability, QueryCapability, QueryLanguage, QueryResults, Row,
};
use crate::models::{GraphEdge, RepositoryFlags, RepositoryKey};
use crate::{Error, Result, lock_poisoned};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// In-memory graph engine for one repository.
#[derive(Debug)]
pub struct InMemoryGraphStore {
    label: String,
    flags: RepositoryFlags,
    edges: RwLock<BTreeSet<GraphEdge>>,
    shut_down: AtomicBool,
}

impl InMemoryGraphStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self::with_flags(label, RepositoryFlags::default())
    }

    /// Creates an empty store with storage flags.
    #[must_use]
    pub fn with_flags(label: impl Into<String>, flags: RepositoryFlags) -> Self {
        Self {
            label: label.into(),
            flags,
            edges: RwLock::new(BTreeSet::new()),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Flags the store was built with.
    #[must_use]
    pub const fn flags(&self) -> RepositoryFlags {
        self.flags
    }

    /// Returns true if the store holds `edge`.
    #[must_use]
    pub fn contains(&self, edge: &GraphEdge) -> bool {
        self.edges.read().is_ok_and(|edges| edges.contains(edge))
    }

    fn ensure_available(&self) -> Result<()> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(Error::RepositoryUnavailable {
                label: self.label.clone(),
            });
        }
        Ok(())
    }

    fn validate<'a>(edges: impl IntoIterator<Item = &'a GraphEdge>) -> Result<()> {
        for edge in edges {
            if let Some(reason) = edge.validation_error() {
                return Err(Error::InvalidInput(reason));
            }
        }
        Ok(())
    }
}

impl GraphStore for InMemoryGraphStore {
    fn label(&self) -> &str {
        &self.label
    }

    fn as_queryable(&self) -> Option<&dyn QueryCapability> {
        Some(self)
    }

    fn as_mutable(&self) -> Option<&dyn MutateCapability> {
        Some(self)
    }

    fn as_importable(&self) -> Option<&dyn ImportCapability> {
        Some(self)
    }

    fn as_maintainable(&self) -> Option<&dyn MaintainCapability> {
        Some(self)
    }
}

impl QueryCapability for InMemoryGraphStore {
    fn languages(&self) -> &[QueryLanguage] {
        &[QueryLanguage::EdgePattern]
    }

    fn query(&self, language: QueryLanguage, query_text: &str) -> Result<QueryResults> {
        self.ensure_available()?;
        if language != QueryLanguage::EdgePattern {
            return Err(Error::QueryExecutionError(format!(
                "repository '{}' does not understand {language:?}",
                self.label
            )));
        }
        let parsed = query::parse(query_text)?;
        parsed.validate()?;

        // Snapshot under one read lock; the stream never sees a later write.
        let matches: Vec<(GraphEdge, Row)> = {
            let edges = self.edges.read().map_err(|_| lock_poisoned("query"))?;
            edges
                .iter()
                .filter_map(|edge| parsed.pattern.bind(edge).map(|row| (edge.clone(), row)))
                .collect()
        };

        tracing::trace!(
            label = %self.label,
            matches = matches.len(),
            "Executed edge pattern query"
        );

        Ok(match parsed.projection {
            Projection::Construct => {
                QueryResults::Edges(Box::new(matches.into_iter().map(|(edge, _)| Ok(edge))))
            },
            Projection::Select { distinct, .. } => {
                let rows = matches.into_iter().map(move |(_, row)| parsed.project(row));
                if distinct {
                    let mut seen = BTreeSet::new();
                    let unique: Vec<Row> = rows.filter(|row| seen.insert(row.clone())).collect();
                    QueryResults::Rows(Box::new(unique.into_iter().map(Ok)))
                } else {
                    QueryResults::Rows(Box::new(rows.map(Ok)))
                }
            },
        })
    }
}

impl MutateCapability for InMemoryGraphStore {
    fn apply(&self, delta: EdgeDelta<'_>) -> Result<()> {
        self.ensure_available()?;
        Self::validate(delta.edges())?;

        let mut edges = self.edges.write().map_err(|_| lock_poisoned("apply"))?;
        for edge in delta.removed {
            edges.remove(edge);
        }
        edges.extend(delta.inserted.iter().cloned());
        Ok(())
    }
}

impl ImportCapability for InMemoryGraphStore {
    fn supported_media_types(&self) -> &[&'static str] {
        &[MEDIA_TYPE_JSON]
    }

    fn import(&self, media_type: &str, payload: &[u8], mode: ImportMode) -> Result<usize> {
        self.ensure_available()?;
        let essence = media_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if essence != MEDIA_TYPE_JSON {
            return Err(Error::UnsupportedMediaType(media_type.to_string()));
        }

        let imported: Vec<GraphEdge> =
            serde_json::from_slice(payload).map_err(|e| Error::MalformedPayload(e.to_string()))?;
        Self::validate(&imported).map_err(|e| Error::MalformedPayload(e.to_string()))?;

        let count = imported.len();
        let mut edges = self.edges.write().map_err(|_| lock_poisoned("import"))?;
        if mode == ImportMode::Replace {
            edges.clear();
        }
        edges.extend(imported);
        Ok(count)
    }
}

impl MaintainCapability for InMemoryGraphStore {
    fn purge(&self) -> Result<()> {
        self.ensure_available()?;
        self.edges
            .write()
            .map_err(|_| lock_poisoned("purge"))?
            .clear();
        Ok(())
    }

    fn shutdown(&self) -> Result<()> {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.edges
            .write()
            .map_err(|_| lock_poisoned("shutdown"))?
            .clear();
        Ok(())
    }

    fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    fn edge_count(&self) -> Result<usize> {
        self.ensure_available()?;
        Ok(self
            .edges
            .read()
            .map_err(|_| lock_poisoned("edge_count"))?
            .len())
    }
}

/// Builds an [`InMemoryGraphStore`] per repository key.
#[derive(Debug, Default)]
pub struct InMemoryRepositoryBuilder {
    built: AtomicUsize,
}

impl InMemoryRepositoryBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stores built so far.
    #[must_use]
    pub fn built(&self) -> usize {
        self.built.load(Ordering::Relaxed)
    }
}

impl RepositoryBuilder for InMemoryRepositoryBuilder {
    fn build(&self, key: &RepositoryKey, flags: RepositoryFlags) -> Result<Arc<dyn GraphStore>> {
        self.built.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            label = %key.label(),
            persistent = flags.persistent,
            "Building in-memory repository"
        );
        Ok(Arc::new(InMemoryGraphStore::with_flags(key.label(), flags)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Term;

    fn edge(s: &str, p: &str, o: &str) -> GraphEdge {
        GraphEdge::new(s, p, Term::iri(o))
    }

    fn apply(
        store: &InMemoryGraphStore,
        inserted: &[GraphEdge],
        removed: &[GraphEdge],
    ) -> Result<()> {
        let inserted: BTreeSet<_> = inserted.iter().cloned().collect();
        let removed: BTreeSet<_> = removed.iter().cloned().collect();
        store.apply(EdgeDelta {
            inserted: &inserted,
            removed: &removed,
        })
    }

    #[test]
    fn test_apply_and_query_subjects() {
        let store = InMemoryGraphStore::new("entities_acme");
        apply(&store, &[edge("s1", "p1", "o1"), edge("s1", "p2", "o2")], &[]).unwrap();

        let rows = store
            .query(QueryLanguage::EdgePattern, "SELECT DISTINCT ?s WHERE ?s ?p ?o")
            .unwrap()
            .into_rows()
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("s"), Some(&Term::iri("s1")));
    }

    #[test]
    fn test_select_without_distinct_keeps_duplicates() {
        let store = InMemoryGraphStore::new("entities_acme");
        apply(&store, &[edge("s1", "p1", "o1"), edge("s1", "p2", "o2")], &[]).unwrap();
        let rows = store
            .query(QueryLanguage::EdgePattern, "SELECT ?s WHERE ?s ?p ?o")
            .unwrap()
            .into_rows()
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_invalid_edge_rejects_whole_delta() {
        let store = InMemoryGraphStore::new("entities_acme");
        let result = apply(&store, &[edge("s1", "p", "o"), edge("", "p", "o")], &[]);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert_eq!(store.edge_count().unwrap(), 0);
    }

    #[test]
    fn test_remove_then_insert() {
        let store = InMemoryGraphStore::new("entities_acme");
        apply(&store, &[edge("s", "p", "old")], &[]).unwrap();
        apply(&store, &[edge("s", "p", "new")], &[edge("s", "p", "old")]).unwrap();
        assert!(store.contains(&edge("s", "p", "new")));
        assert!(!store.contains(&edge("s", "p", "old")));
    }

    #[test]
    fn test_construct_returns_edges() {
        let store = InMemoryGraphStore::new("entities_acme");
        apply(&store, &[edge("s1", "p", "o"), edge("s2", "p", "o")], &[]).unwrap();
        let edges = store
            .query(QueryLanguage::EdgePattern, "CONSTRUCT WHERE <s2> ?p ?o")
            .unwrap()
            .into_edges()
            .unwrap();
        assert_eq!(edges, vec![edge("s2", "p", "o")]);
    }

    #[test]
    fn test_native_language_is_execution_error() {
        let store = InMemoryGraphStore::new("entities_acme");
        let result = store.query(QueryLanguage::Native("sparql"), "SELECT * {}");
        assert!(matches!(result, Err(Error::QueryExecutionError(_))));
    }

    #[test]
    fn test_import_json_replace_and_append() {
        let store = InMemoryGraphStore::new("schema_acme");
        apply(&store, &[edge("old", "p", "o")], &[]).unwrap();

        let payload = serde_json::to_vec(&vec![edge("a", "p", "o"), edge("b", "p", "o")]).unwrap();
        let count = store
            .import("application/json; charset=utf-8", &payload, ImportMode::Replace)
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(store.edge_count().unwrap(), 2);
        assert!(!store.contains(&edge("old", "p", "o")));

        let payload = serde_json::to_vec(&vec![edge("c", "p", "o")]).unwrap();
        store.import(MEDIA_TYPE_JSON, &payload, ImportMode::Append).unwrap();
        assert_eq!(store.edge_count().unwrap(), 3);
    }

    #[test]
    fn test_import_errors_leave_content() {
        let store = InMemoryGraphStore::new("schema_acme");
        apply(&store, &[edge("keep", "p", "o")], &[]).unwrap();

        assert!(matches!(
            store.import("text/turtle", b"<a> <b> <c> .", ImportMode::Replace),
            Err(Error::UnsupportedMediaType(_))
        ));
        assert!(matches!(
            store.import(MEDIA_TYPE_JSON, b"{not json", ImportMode::Replace),
            Err(Error::MalformedPayload(_))
        ));
        assert_eq!(store.edge_count().unwrap(), 1);
    }

    #[test]
    fn test_purge_keeps_store_usable() {
        let store = InMemoryGraphStore::new("entities_acme");
        apply(&store, &[edge("s", "p", "o")], &[]).unwrap();
        store.purge().unwrap();
        assert_eq!(store.edge_count().unwrap(), 0);
        apply(&store, &[edge("s", "p", "o")], &[]).unwrap();
        assert_eq!(store.edge_count().unwrap(), 1);
    }

    #[test]
    fn test_shutdown_is_idempotent_and_final() {
        let store = InMemoryGraphStore::new("entities_acme");
        store.shutdown().unwrap();
        store.shutdown().unwrap();
        assert!(store.is_shut_down());
        assert!(matches!(
            apply(&store, &[edge("s", "p", "o")], &[]),
            Err(Error::RepositoryUnavailable { .. })
        ));
    }

    #[test]
    fn test_builder_counts_builds() {
        let builder = InMemoryRepositoryBuilder::new();
        let key = RepositoryKey::new("acme".into(), crate::models::RepositoryType::Entities);
        let store = builder.build(&key, RepositoryFlags::default()).unwrap();
        assert_eq!(store.label(), "entities_acme");
        assert_eq!(builder.built(), 1);
    }
}
