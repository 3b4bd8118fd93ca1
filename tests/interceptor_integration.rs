//! Interceptor and end-to-end scenario tests.
//!
//! Covers enforcement before execution, the administrative surface, and the
//! reset scenario on tenant "acme".

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::cell::Cell;
use std::sync::Arc;
use tenantgraph::config::{RegistryConfig, StorageConfig, TransactionConfig};
use tenantgraph::observability::{EventBus, EventScope};
use tenantgraph::storage::traits::{ImportMode, MEDIA_TYPE_JSON, QueryLanguage};
use tenantgraph::{
    AdminService, Authority, EntityService, Error, GraphEdge, InMemoryRepositoryBuilder,
    Interceptor, Operation, OperationMetadata, Principal, RepositoryRegistry, RepositoryType,
    Result, SessionContext, TenantId, Term, TransactionManager,
};

struct Services {
    entities: EntityService,
    admin: AdminService,
    events: EventBus,
}

fn services() -> Services {
    let registry = Arc::new(RepositoryRegistry::new(
        Arc::new(InMemoryRepositoryBuilder::new()),
        RegistryConfig::default(),
    ));
    let events = EventBus::new(64);
    let interceptor = Interceptor::new(StorageConfig::default());
    let manager = TransactionManager::new(Arc::clone(&registry), TransactionConfig::default())
        .with_event_bus(events.clone());
    Services {
        entities: EntityService::new(interceptor.clone(), Arc::new(manager)),
        admin: AdminService::new(interceptor, registry),
        events,
    }
}

fn session(authority: Authority) -> SessionContext {
    SessionContext::new(Principal::new("caller", [authority]), TenantId::new("acme"))
}

fn subjects(s: &Services, ctx: &mut SessionContext) -> Vec<String> {
    s.entities
        .query(ctx, QueryLanguage::EdgePattern, "SELECT DISTINCT ?s WHERE ?s ?p ?o")
        .unwrap()
        .into_rows()
        .unwrap()
        .into_iter()
        .filter_map(|row| row.get("s").map(|t| t.as_str().to_string()))
        .collect()
}

/// Operation that records whether it ran.
struct RecordingOperation<'a> {
    ran: &'a Cell<bool>,
    metadata: OperationMetadata,
}

impl Operation for RecordingOperation<'_> {
    type Output = ();

    fn name(&self) -> &str {
        "record_run"
    }

    fn metadata(&self) -> OperationMetadata {
        self.metadata
    }

    fn execute(self, _ctx: &SessionContext) -> Result<()> {
        self.ran.set(true);
        Ok(())
    }
}

#[test]
fn test_user_cannot_run_application_operation() {
    let ran = Cell::new(false);
    let mut ctx = session(Authority::User);
    let err = Interceptor::default()
        .invoke(
            &mut ctx,
            RecordingOperation {
                ran: &ran,
                metadata: OperationMetadata::new(RepositoryType::Entities, Authority::Application),
            },
        )
        .unwrap_err();

    assert!(matches!(
        err,
        Error::InsufficientAuthority {
            required: Authority::Application,
            ..
        }
    ));
    assert!(!ran.get());
    assert!(!ctx.environment().is_authorized());
}

#[test]
fn test_missing_declaration_is_reported_before_authority() {
    let ran = Cell::new(false);
    let mut ctx = session(Authority::Reader);
    let err = Interceptor::default()
        .invoke(
            &mut ctx,
            RecordingOperation {
                ran: &ran,
                metadata: OperationMetadata::unset(Authority::System),
            },
        )
        .unwrap_err();
    assert!(matches!(err, Error::MissingRepositoryDeclaration { .. }));
    assert!(!ran.get());
}

#[test]
fn test_acme_reset_scenario() {
    let s = services();
    let mut user = session(Authority::User);
    assert!(subjects(&s, &mut user).is_empty());

    s.entities
        .insert_edges(
            &mut user,
            [
                GraphEdge::new("s1", "p1", Term::iri("o1")),
                GraphEdge::new("s1", "p2", Term::iri("o2")),
            ],
        )
        .unwrap();
    assert_eq!(subjects(&s, &mut user), vec!["s1".to_string()]);

    assert!(matches!(
        s.admin.reset(&mut user, RepositoryType::Entities),
        Err(Error::InsufficientAuthority { .. })
    ));
    assert_eq!(subjects(&s, &mut user), vec!["s1".to_string()]);

    let mut app = session(Authority::Application);
    s.admin.reset(&mut app, RepositoryType::Entities).unwrap();
    assert!(subjects(&s, &mut user).is_empty());

    // The handle survives the reset.
    s.entities
        .insert_edges(&mut user, [GraphEdge::new("s2", "p", Term::iri("o"))])
        .unwrap();
    assert_eq!(subjects(&s, &mut user), vec!["s2".to_string()]);
}

#[test]
fn test_import_errors_leave_repository_unchanged() {
    let s = services();
    let mut app = session(Authority::Application);
    let payload =
        serde_json::to_vec(&vec![GraphEdge::new("s1", "p", Term::literal("v"))]).unwrap();
    s.admin
        .import(&mut app, RepositoryType::Entities, MEDIA_TYPE_JSON, &payload, ImportMode::Replace)
        .unwrap();

    let mut import = |media_type: &str, payload: &[u8]| {
        s.admin
            .import(&mut app, RepositoryType::Entities, media_type, payload, ImportMode::Replace)
    };
    assert!(matches!(import("text/turtle", &[]), Err(Error::UnsupportedMediaType(_))));
    assert!(matches!(import(MEDIA_TYPE_JSON, b"[{".as_slice()), Err(Error::MalformedPayload(_))));

    let mut reader = session(Authority::Reader);
    assert_eq!(subjects(&s, &mut reader), vec!["s1".to_string()]);
}

#[test]
fn test_system_session_runs_administration() {
    let s = services();
    let mut system = SessionContext::system(TenantId::new("acme"));
    assert!(system.is_scheduled());

    s.admin.reset(&mut system, RepositoryType::Schema).unwrap();
    let report = s.admin.diagnostics(&mut system).unwrap();
    assert_eq!(report.len(), 1);
    assert_eq!(report[0].label, "schema_acme");

    assert!(s.admin.shutdown(&mut system, RepositoryType::Schema).unwrap());
    assert!(s.admin.diagnostics(&mut system).unwrap().is_empty());
}

#[tokio::test]
async fn test_completed_write_emits_event() {
    let s = services();
    let mut events = s.events.subscribe(EventScope::tenant(TenantId::new("acme")));
    let mut user =
        session(Authority::User).with_request(tenantgraph::RequestDetails::from_id("req-42"));

    let tx = s
        .entities
        .insert_edges(&mut user, [GraphEdge::new("s1", "p", Term::iri("o"))])
        .unwrap();

    let event = events.recv().await.unwrap();
    assert_eq!(event.transaction_id, tx.id());
    assert_eq!(event.repository_type, RepositoryType::Entities);
    assert_eq!(event.meta.correlation_id.as_deref(), Some("req-42"));
    assert!(event.touches("s1"));
}
