//! Administrative operations.
//!
//! Reset and import need APPLICATION authority; shutdown and diagnostics
//! need SYSTEM. The caller names the repository type; the tenant comes from
//! the session context.

use super::interceptor::{Interceptor, OperationMetadata};
use crate::context::SessionContext;
use crate::models::RepositoryType;
use crate::security::Authority;
use crate::storage::traits::{GraphStoreExt, ImportMode};
use crate::storage::{RepositoryDiagnostics, RepositoryRegistry};
use crate::Result;
use std::sync::Arc;
use tracing::instrument;

/// Reset, shutdown, import and diagnostics behind the interceptor.
#[derive(Debug, Clone)]
pub struct AdminService {
    interceptor: Interceptor,
    registry: Arc<RepositoryRegistry>,
}

impl AdminService {
    /// Creates the service.
    #[must_use]
    pub const fn new(interceptor: Interceptor, registry: Arc<RepositoryRegistry>) -> Self {
        Self {
            interceptor,
            registry,
        }
    }

    /// Purges the tenant's repository of `repository_type`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InsufficientAuthority`] below APPLICATION, or
    /// an error from the engine.
    #[instrument(skip(self, ctx), fields(operation = "reset"))]
    pub fn reset(&self, ctx: &mut SessionContext, repository_type: RepositoryType) -> Result<()> {
        let registry = &self.registry;
        self.interceptor.call(
            ctx,
            "reset",
            OperationMetadata::new(repository_type, Authority::Application),
            |ctx| {
                registry.reset(
                    ctx.environment(),
                    ctx.principal().authorities(),
                    Authority::Application,
                )
            },
        )
    }

    /// Shuts down the tenant's repository of `repository_type`.
    ///
    /// Returns false if no handle was live.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InsufficientAuthority`] below SYSTEM.
    #[instrument(skip(self, ctx), fields(operation = "shutdown"))]
    pub fn shutdown(
        &self,
        ctx: &mut SessionContext,
        repository_type: RepositoryType,
    ) -> Result<bool> {
        let registry = &self.registry;
        self.interceptor.call(
            ctx,
            "shutdown",
            OperationMetadata::new(repository_type, Authority::System),
            |ctx| registry.shutdown(&ctx.environment().repository_key()?),
        )
    }

    /// Bulk-loads `payload` into the tenant's repository of `repository_type`.
    ///
    /// Returns the number of edges read from the payload.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UnsupportedMediaType`] or
    /// [`crate::Error::MalformedPayload`] from the engine, leaving the
    /// repository unchanged, or an authorization error.
    #[instrument(skip(self, ctx, payload), fields(operation = "import", bytes = payload.len()))]
    pub fn import(
        &self,
        ctx: &mut SessionContext,
        repository_type: RepositoryType,
        media_type: &str,
        payload: &[u8],
        mode: ImportMode,
    ) -> Result<usize> {
        let registry = &self.registry;
        self.interceptor.call(
            ctx,
            "import",
            OperationMetadata::new(repository_type, Authority::Application),
            |ctx| {
                let handle = registry.resolve(ctx.environment())?;
                let lease = handle.checkout()?;
                let count = lease.store().importable()?.import(media_type, payload, mode)?;
                tracing::info!(label = %handle.label(), count, ?mode, "Imported edges");
                Ok(count)
            },
        )
    }

    /// Snapshot of every live repository handle.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InsufficientAuthority`] below SYSTEM.
    pub fn diagnostics(&self, ctx: &mut SessionContext) -> Result<Vec<RepositoryDiagnostics>> {
        let registry = &self.registry;
        self.interceptor.call(
            ctx,
            "diagnostics",
            OperationMetadata::new(RepositoryType::Application, Authority::System),
            |_| registry.diagnostics(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegistryConfig;
    use crate::models::{GraphEdge, Term, TenantId};
    use crate::security::Principal;
    use crate::storage::InMemoryRepositoryBuilder;
    use crate::storage::traits::MEDIA_TYPE_JSON;
    use crate::Error;

    fn service() -> AdminService {
        let registry = Arc::new(RepositoryRegistry::new(
            Arc::new(InMemoryRepositoryBuilder::new()),
            RegistryConfig::default(),
        ));
        AdminService::new(Interceptor::default(), registry)
    }

    fn ctx(authority: Authority) -> SessionContext {
        SessionContext::new(Principal::new("admin", [authority]), TenantId::new("acme"))
    }

    fn payload() -> Vec<u8> {
        serde_json::to_vec(&vec![GraphEdge::new("s", "p", Term::iri("o"))]).unwrap()
    }

    #[test]
    fn test_import_requires_application() {
        let service = service();
        let import = |authority| {
            service.import(
                &mut ctx(authority),
                RepositoryType::Schema,
                MEDIA_TYPE_JSON,
                &payload(),
                ImportMode::Replace,
            )
        };
        let err = import(Authority::User).unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientAuthority {
                required: Authority::Application,
                ..
            }
        ));

        let count = import(Authority::Application).unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_shutdown_requires_system() {
        let service = service();
        let mut app = ctx(Authority::Application);
        service.reset(&mut app, RepositoryType::Entities).unwrap();
        assert!(matches!(
            service.shutdown(&mut app, RepositoryType::Entities),
            Err(Error::InsufficientAuthority { required: Authority::System, .. })
        ));
        assert!(service.shutdown(&mut ctx(Authority::System), RepositoryType::Entities).unwrap());
    }

    #[test]
    fn test_diagnostics_lists_handles() {
        let service = service();
        let mut system = SessionContext::system(TenantId::new("acme"));
        service.reset(&mut system, RepositoryType::Entities).unwrap();
        let report = service.diagnostics(&mut system).unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].label, "entities_acme");
        assert_eq!(report[0].connections, 0);
    }
}
