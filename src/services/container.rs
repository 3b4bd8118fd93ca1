//! Service wiring from a [`GraphConfig`].
//!
//! ```text
//! GraphServices::from_config
//!   ├── EventBus::new(event_capacity)
//!   ├── RepositoryRegistry::new(builder, registry)
//!   ├── TransactionManager::new(registry, transactions).with_event_bus(bus)
//!   ├── EntityService::new(Interceptor::new(storage), manager)
//!   └── AdminService::new(Interceptor::new(storage), registry)
//! ```

use super::{AdminService, EntityService, Interceptor, TransactionManager};
use crate::config::GraphConfig;
use crate::observability::EventBus;
use crate::storage::{RepositoryBuilder, RepositoryRegistry};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Every service built from one configuration, sharing one registry and bus.
#[derive(Debug, Clone)]
pub struct GraphServices {
    registry: Arc<RepositoryRegistry>,
    transactions: Arc<TransactionManager>,
    entities: EntityService,
    admin: AdminService,
    events: EventBus,
}

impl GraphServices {
    /// Wires the services over `builder` with the settings in `config`.
    #[must_use]
    pub fn from_config(config: &GraphConfig, builder: Arc<dyn RepositoryBuilder>) -> Self {
        let events = EventBus::new(config.event_capacity);
        let registry = Arc::new(RepositoryRegistry::new(builder, config.registry));
        let transactions = Arc::new(
            TransactionManager::new(Arc::clone(&registry), config.transactions)
                .with_event_bus(events.clone()),
        );
        let interceptor = Interceptor::new(config.storage.clone());
        tracing::debug!(
            event_capacity = config.event_capacity,
            ledger_capacity = config.transactions.ledger_capacity,
            "Wired graph services"
        );

        Self {
            entities: EntityService::new(interceptor.clone(), Arc::clone(&transactions)),
            admin: AdminService::new(interceptor, Arc::clone(&registry)),
            registry,
            transactions,
            events,
        }
    }

    /// The shared repository registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<RepositoryRegistry> {
        &self.registry
    }

    /// The shared transaction manager.
    #[must_use]
    pub const fn transactions(&self) -> &Arc<TransactionManager> {
        &self.transactions
    }

    /// Entity reads and writes.
    #[must_use]
    pub const fn entities(&self) -> &EntityService {
        &self.entities
    }

    /// Administrative operations.
    #[must_use]
    pub const fn admin(&self) -> &AdminService {
        &self.admin
    }

    /// The bus completion events are published on.
    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// Starts the registry's status sweeper on the current tokio runtime.
    #[must_use]
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        self.registry.spawn_sweeper()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::context::SessionContext;
    use crate::models::{
        GraphEdge, RepositoryFlags, RepositoryKey, RepositoryType, TenantId, Term,
    };
    use crate::observability::EventScope;
    use crate::security::{Authority, Principal};
    use crate::storage::InMemoryRepositoryBuilder;

    fn user() -> SessionContext {
        SessionContext::new(Principal::new("alice", [Authority::User]), TenantId::new("acme"))
    }

    #[test]
    fn test_services_share_registry_and_bus() {
        let builder = Arc::new(InMemoryRepositoryBuilder::new());
        let services = GraphServices::from_config(&GraphConfig::default(), builder);
        assert!(Arc::ptr_eq(services.registry(), services.transactions().registry()));

        let mut subscription = services.events().subscribe(EventScope::all());
        let mut ctx = user();
        services
            .entities()
            .insert_edges(&mut ctx, [GraphEdge::new("s1", "p", Term::iri("o"))])
            .unwrap();

        let event = subscription.try_recv().unwrap().unwrap();
        assert_eq!(event.repository_type, RepositoryType::Entities);
    }

    #[test]
    fn test_storage_flags_reach_repositories() {
        let persistent = RepositoryFlags {
            persistent: true,
            public: false,
        };
        let storage = StorageConfig::default().with_flags(RepositoryType::Entities, persistent);
        let config = GraphConfig::default().with_storage(storage);
        let builder = Arc::new(InMemoryRepositoryBuilder::new());
        let services = GraphServices::from_config(&config, builder);

        let mut ctx = user();
        services
            .entities()
            .insert_edges(&mut ctx, [GraphEdge::new("s1", "p", Term::iri("o"))])
            .unwrap();

        let key = RepositoryKey::new(TenantId::new("acme"), RepositoryType::Entities);
        let handle = services.registry().get(&key).unwrap().unwrap();
        assert!(handle.flags().persistent);
        assert!(services.admin().diagnostics(&mut ctx).is_err());
    }
}
