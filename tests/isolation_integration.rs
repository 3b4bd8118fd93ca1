//! Tenant isolation and registry integration tests.
//!
//! Exercises repository resolution through the public API: per-tenant
//! isolation, idempotent handle construction under concurrent first access,
//! and lease accounting.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use tenantgraph::config::{RegistryConfig, StorageConfig, TransactionConfig};
use tenantgraph::models::RepositoryFlags;
use tenantgraph::observability::EventBus;
use tenantgraph::storage::traits::{GraphStoreExt, QueryLanguage};
use tenantgraph::{
    Authority, EntityService, Error, GraphEdge, InMemoryRepositoryBuilder, Interceptor,
    OperationMetadata, Principal, RepositoryKey, RepositoryRegistry, RepositoryType,
    SessionContext, TenantId, Term, TransactionManager,
};

struct Harness {
    registry: Arc<RepositoryRegistry>,
    builder: Arc<InMemoryRepositoryBuilder>,
    entities: EntityService,
}

fn harness() -> Harness {
    let builder = Arc::new(InMemoryRepositoryBuilder::new());
    let registry = Arc::new(RepositoryRegistry::new(
        builder.clone(),
        RegistryConfig::default(),
    ));
    let manager = TransactionManager::new(Arc::clone(&registry), TransactionConfig::default())
        .with_event_bus(EventBus::new(64));
    let interceptor = Interceptor::new(StorageConfig::default());
    let entities = EntityService::new(interceptor, Arc::new(manager));
    Harness {
        registry,
        builder,
        entities,
    }
}

fn user(tenant: &str) -> SessionContext {
    SessionContext::new(Principal::new("alice", [Authority::User]), TenantId::new(tenant))
}

fn edge(s: &str, p: &str, o: &str) -> GraphEdge {
    GraphEdge::new(s, p, Term::iri(o))
}

fn subjects(h: &Harness, ctx: &mut SessionContext) -> Vec<String> {
    h.entities
        .query(ctx, QueryLanguage::EdgePattern, "SELECT DISTINCT ?s WHERE ?s ?p ?o")
        .unwrap()
        .into_rows()
        .unwrap()
        .into_iter()
        .filter_map(|row| row.get("s").map(|t| t.as_str().to_string()))
        .collect()
}

#[test]
fn test_mutations_are_invisible_to_other_tenants() {
    let h = harness();
    let mut acme = user("acme");
    let mut globex = user("globex");

    h.entities.insert_edges(&mut acme, [edge("s1", "p", "o")]).unwrap();
    h.entities.insert_edges(&mut globex, [edge("g1", "p", "o")]).unwrap();

    assert_eq!(subjects(&h, &mut acme), vec!["s1".to_string()]);
    assert_eq!(subjects(&h, &mut globex), vec!["g1".to_string()]);
    assert!(h.entities.read_entity(&mut globex, "s1").unwrap().is_empty());
}

#[test]
fn test_stages_are_separate_repositories() {
    let h = harness();
    let mut live = user("acme");
    let mut staging = user("acme").with_stage("test");

    h.entities.insert_edges(&mut staging, [edge("s1", "p", "o")]).unwrap();
    assert!(subjects(&h, &mut live).is_empty());
    assert_eq!(subjects(&h, &mut staging), vec!["s1".to_string()]);

    let labels: Vec<String> = h
        .registry
        .diagnostics()
        .unwrap()
        .into_iter()
        .map(|d| d.label)
        .collect();
    assert!(labels.contains(&"entities_acme_test".to_string()));
    assert!(labels.contains(&"entities_acme".to_string()));
}

#[test]
fn test_concurrent_first_access_resolves_one_handle() {
    let h = harness();
    let interceptor = Interceptor::default();
    let meta = OperationMetadata::new(RepositoryType::Entities, Authority::Reader);

    let handles: Vec<_> = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..16)
            .map(|_| {
                let registry = &h.registry;
                let interceptor = &interceptor;
                scope.spawn(move || {
                    let mut ctx = user("acme");
                    interceptor
                        .call(&mut ctx, "resolve", meta, |ctx| registry.resolve(ctx.environment()))
                        .unwrap()
                })
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    assert!(handles.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    assert_eq!(h.builder.built(), 1);
}

#[test]
fn test_unauthorized_environment_cannot_resolve() {
    let h = harness();
    let ctx = user("acme");
    assert!(matches!(h.registry.resolve(ctx.environment()), Err(Error::Unauthorized(_))));
}

#[test]
fn test_environment_cannot_resolve_after_intercepted_call() {
    let h = harness();
    let mut ctx = user("acme");
    let meta = OperationMetadata::new(RepositoryType::Entities, Authority::Reader);
    let registry = &h.registry;
    Interceptor::default()
        .call(&mut ctx, "resolve", meta, |ctx| registry.resolve(ctx.environment()))
        .unwrap();

    assert!(matches!(h.registry.resolve(ctx.environment()), Err(Error::Unauthorized(_))));
    let leaked = ctx.environment().clone();
    assert!(matches!(h.registry.resolve(&leaked), Err(Error::Unauthorized(_))));
}

#[test]
fn test_leases_are_released_on_error_paths() {
    let h = harness();
    let mut ctx = user("acme");
    let err = h
        .entities
        .query(&mut ctx, QueryLanguage::EdgePattern, "SELECT ?missing WHERE ?s ?p ?o")
        .unwrap_err();
    assert!(matches!(err, Error::QueryExecutionError(_)));

    let key = RepositoryKey::new(TenantId::new("acme"), RepositoryType::Entities);
    let handle = h.registry.get(&key).unwrap().unwrap();
    assert_eq!(handle.open_connections(), 0);
}

#[test]
fn test_shutdown_invalidates_handle_and_rebuilds_on_resolve() {
    let h = harness();
    let key = RepositoryKey::new(TenantId::new("acme"), RepositoryType::Entities);
    let handle = h.registry.resolve_key(&key, RepositoryFlags::default()).unwrap();
    let in_flight = h.registry.checkout(&handle).unwrap();

    assert!(h.registry.shutdown(&key).unwrap());
    assert!(matches!(
        h.registry.checkout(&handle),
        Err(Error::RepositoryUnavailable { .. })
    ));
    // The lease checked out before shutdown keeps working until dropped.
    assert!(in_flight.store().queryable().is_ok());
    drop(in_flight);

    let rebuilt = h.registry.resolve_key(&key, RepositoryFlags::default()).unwrap();
    assert!(!Arc::ptr_eq(&handle, &rebuilt));
}
