//! Configuration integration tests.
//!
//! Covers `TENANTGRAPH_*` environment overrides and the services they
//! configure. Tests touching the environment hold `ENV_LOCK` so they never
//! observe each other's variables.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tenantgraph::config::LoggingSettings;
use tenantgraph::observability::{EventScope, LogFormat};
use tenantgraph::{
    Authority, GraphConfig, GraphEdge, GraphServices, InMemoryRepositoryBuilder, Principal,
    RepositoryType, SessionContext, TenantId, Term,
};

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Sets variables for the lifetime of the guard and removes them on drop.
struct EnvGuard {
    names: Vec<&'static str>,
    _lock: MutexGuard<'static, ()>,
}

impl EnvGuard {
    fn set(vars: &[(&'static str, &str)]) -> Self {
        let lock = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        for (name, value) in vars {
            // SAFETY: every test that touches the environment holds ENV_LOCK
            unsafe {
                std::env::set_var(name, value);
            }
        }
        Self {
            names: vars.iter().map(|(name, _)| *name).collect(),
            _lock: lock,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for name in &self.names {
            // SAFETY: ENV_LOCK is still held
            unsafe {
                std::env::remove_var(name);
            }
        }
    }
}

#[test]
fn test_env_overrides_every_setting() {
    let _env = EnvGuard::set(&[
        ("TENANTGRAPH_IDLE_AFTER_SECS", "7"),
        ("TENANTGRAPH_EVICT_AFTER_SECS", "9"),
        ("TENANTGRAPH_SWEEP_INTERVAL_MS", "25"),
        ("TENANTGRAPH_LEDGER_CAPACITY", "32"),
        ("TENANTGRAPH_EVENT_CAPACITY", "4"),
    ]);
    let config = GraphConfig::default().with_env_overrides();

    assert_eq!(config.registry.idle_after, Duration::from_secs(7));
    assert_eq!(config.registry.evict_after, Duration::from_secs(9));
    assert_eq!(config.registry.sweep_interval, Duration::from_millis(25));
    assert_eq!(config.transactions.ledger_capacity, 32);
    assert_eq!(config.event_capacity, 4);
}

#[test]
fn test_env_overrides_take_precedence_over_file() {
    let _env = EnvGuard::set(&[("TENANTGRAPH_LEDGER_CAPACITY", " 64 ")]);
    let config = GraphConfig::from_toml("[transactions]\nledger_capacity = 16\n")
        .unwrap()
        .with_env_overrides();
    assert_eq!(config.transactions.ledger_capacity, 64);
}

#[test]
fn test_invalid_env_values_are_ignored() {
    let _env = EnvGuard::set(&[
        ("TENANTGRAPH_IDLE_AFTER_SECS", "soon"),
        ("TENANTGRAPH_EVENT_CAPACITY", "-1"),
    ]);
    let config = GraphConfig::default().with_env_overrides();
    let defaults = GraphConfig::default();

    assert_eq!(config.registry.idle_after, defaults.registry.idle_after);
    assert_eq!(config.event_capacity, defaults.event_capacity);
}

#[test]
fn test_zero_capacities_are_clamped() {
    let _env = EnvGuard::set(&[
        ("TENANTGRAPH_SWEEP_INTERVAL_MS", "0"),
        ("TENANTGRAPH_LEDGER_CAPACITY", "0"),
        ("TENANTGRAPH_EVENT_CAPACITY", "0"),
    ]);
    let config = GraphConfig::default().with_env_overrides();

    assert_eq!(config.registry.sweep_interval, Duration::from_millis(1));
    assert_eq!(config.transactions.ledger_capacity, 1);
    assert_eq!(config.event_capacity, 1);
}

#[test]
fn test_log_env_overrides_configured_filter() {
    let settings = LoggingSettings {
        format: Some("json".to_string()),
        filter: Some("tenantgraph=debug".to_string()),
    };

    let configured = {
        let _env = EnvGuard::set(&[]);
        tenantgraph::observability::LoggingConfig::from_settings(Some(&settings))
    };
    assert!(configured.filter.to_string().contains("tenantgraph=debug"));

    let _env = EnvGuard::set(&[("TENANTGRAPH_LOG", "tenantgraph=trace")]);
    let overridden = tenantgraph::observability::LoggingConfig::from_settings(Some(&settings));
    let filter = overridden.filter.to_string();
    assert!(filter.contains("tenantgraph=trace"));
    assert!(!filter.contains("tenantgraph=debug"));
    assert_eq!(overridden.format, LogFormat::Json);
}

#[test]
fn test_logging_config_reads_file_section() {
    let _env = EnvGuard::set(&[]);
    let config = GraphConfig::from_toml("[logging]\nfilter = \"tenantgraph=warn\"\n").unwrap();
    let logging = config.logging_config();
    assert!(logging.filter.to_string().contains("tenantgraph=warn"));
    assert_eq!(logging.format, LogFormat::Pretty);
}

#[test]
fn test_event_capacity_reaches_services() {
    let config = {
        let _env = EnvGuard::set(&[("TENANTGRAPH_EVENT_CAPACITY", "1")]);
        GraphConfig::default().with_env_overrides()
    };
    let services = GraphServices::from_config(&config, Arc::new(InMemoryRepositoryBuilder::new()));
    let mut subscription = services.events().subscribe(EventScope::all());

    let mut ctx = SessionContext::new(
        Principal::new("alice", [Authority::User]),
        TenantId::new("acme"),
    );
    for subject in ["s1", "s2"] {
        services
            .entities()
            .insert_edges(&mut ctx, [GraphEdge::new(subject, "p", Term::iri("o"))])
            .unwrap();
    }

    // A one-slot buffer keeps only the latest completion.
    let event = subscription.try_recv().unwrap().unwrap();
    assert_eq!(event.repository_type, RepositoryType::Entities);
    assert!(subscription.try_recv().unwrap().is_none());
}
