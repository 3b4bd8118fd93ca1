//! Routing and privilege interceptor.
//!
//! Every domain operation declares the repository type it targets and the
//! minimum authority it requires. The interceptor is the single place where
//! that declaration is checked against the caller:
//!
//! 1. An unset repository type fails with [`Error::MissingRepositoryDeclaration`]
//! 2. The resolved type (and its storage flags) is written into the environment
//! 3. The caller's authorities are compared against the declared minimum; on
//!    failure [`Error::InsufficientAuthority`] is returned and the operation
//!    never runs
//! 4. The environment is marked authorized and the operation executes
//!
//! The authorization lasts for the one call: once the operation returns, on
//! success or error, the environment is unauthorized again and cannot resolve
//! a repository outside the interceptor.
//!
//! # Usage
//!
//! ```rust,ignore
//! use tenantgraph::services::{DeclaredOperation, Interceptor, OperationMetadata};
//!
//! let interceptor = Interceptor::new(config.storage.clone());
//! let count = interceptor.invoke(
//!     &mut ctx,
//!     DeclaredOperation::new(
//!         "count_entities",
//!         OperationMetadata::new(RepositoryType::Entities, Authority::Reader),
//!         |ctx| registry.resolve(ctx.environment()).map(|h| h.open_connections()),
//!     ),
//! )?;
//! ```

use crate::config::StorageConfig;
use crate::context::SessionContext;
use crate::models::RepositoryType;
use crate::security::{AccessResult, Authority};
use crate::{Error, Result};
use std::fmt;

/// Declared routing and authority requirements of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationMetadata {
    /// Target repository type; `None` is a declaration defect.
    pub repository_type: Option<RepositoryType>,
    /// Minimum authority the caller must hold.
    pub required: Authority,
}

impl OperationMetadata {
    /// Declares a repository type and minimum authority.
    #[must_use]
    pub const fn new(repository_type: RepositoryType, required: Authority) -> Self {
        Self {
            repository_type: Some(repository_type),
            required,
        }
    }

    /// Metadata without a repository type.
    #[must_use]
    pub const fn unset(required: Authority) -> Self {
        Self {
            repository_type: None,
            required,
        }
    }
}

/// A domain operation carrying its own declaration.
pub trait Operation {
    /// Value produced by the operation.
    type Output;

    /// Operation name used in errors and logs.
    fn name(&self) -> &str;

    /// Declared routing and authority requirements.
    fn metadata(&self) -> OperationMetadata;

    /// Runs the operation against an authorized context.
    ///
    /// # Errors
    ///
    /// Returns whatever the domain logic fails with.
    fn execute(self, ctx: &SessionContext) -> Result<Self::Output>
    where
        Self: Sized;
}

/// Operation built from a closure and explicit metadata.
pub struct DeclaredOperation<F> {
    name: &'static str,
    metadata: OperationMetadata,
    run: F,
}

impl<F> fmt::Debug for DeclaredOperation<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeclaredOperation")
            .field("name", &self.name)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

impl<F> DeclaredOperation<F> {
    /// Wraps `run` with a name and declaration.
    #[must_use]
    pub const fn new(name: &'static str, metadata: OperationMetadata, run: F) -> Self {
        Self {
            name,
            metadata,
            run,
        }
    }
}

impl<F, T> Operation for DeclaredOperation<F>
where
    F: FnOnce(&SessionContext) -> Result<T>,
{
    type Output = T;

    fn name(&self) -> &str {
        self.name
    }

    fn metadata(&self) -> OperationMetadata {
        self.metadata
    }

    fn execute(self, ctx: &SessionContext) -> Result<T> {
        (self.run)(ctx)
    }
}

/// Single policy-enforcement point for routing and authority.
#[derive(Debug, Clone, Default)]
pub struct Interceptor {
    storage: StorageConfig,
}

impl Interceptor {
    /// Creates an interceptor resolving storage flags from `storage`.
    #[must_use]
    pub const fn new(storage: StorageConfig) -> Self {
        Self { storage }
    }

    /// Checks the declaration of `operation` and runs it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingRepositoryDeclaration`] or
    /// [`Error::InsufficientAuthority`] without running the operation, or the
    /// operation's own error.
    pub fn invoke<O: Operation>(
        &self,
        ctx: &mut SessionContext,
        operation: O,
    ) -> Result<O::Output> {
        self.authorize(ctx, operation.name(), operation.metadata())?;
        let output = operation.execute(ctx);
        ctx.environment_mut().set_authorized(false);
        if let Err(ref e) = output {
            tracing::debug!(error = %e, "Intercepted operation failed");
        }
        output
    }

    /// Shorthand for [`invoke`](Self::invoke) with a [`DeclaredOperation`].
    ///
    /// # Errors
    ///
    /// See [`invoke`](Self::invoke).
    pub fn call<T>(
        &self,
        ctx: &mut SessionContext,
        name: &'static str,
        metadata: OperationMetadata,
        run: impl FnOnce(&SessionContext) -> Result<T>,
    ) -> Result<T> {
        self.invoke(ctx, DeclaredOperation::new(name, metadata, run))
    }

    fn authorize(
        &self,
        ctx: &mut SessionContext,
        operation: &str,
        metadata: OperationMetadata,
    ) -> Result<()> {
        let Some(repository_type) = metadata.repository_type else {
            tracing::error!(operation, "Operation declares no repository type");
            return Err(Error::MissingRepositoryDeclaration {
                operation: operation.to_string(),
            });
        };

        let flags = self.storage.flags_for(repository_type);
        ctx.environment_mut().bind(repository_type, flags);

        match ctx.principal().check(metadata.required) {
            AccessResult::Granted => {
                ctx.environment_mut().set_authorized(true);
                tracing::debug!(
                    operation,
                    principal = ctx.principal().name(),
                    tenant = %ctx.environment().tenant(),
                    repository_type = %repository_type,
                    "Operation authorized"
                );
                Ok(())
            },
            AccessResult::Denied(reason) => {
                metrics::counter!(
                    "interceptor_denied_total",
                    "required" => metadata.required.as_str()
                )
                .increment(1);
                tracing::warn!(
                    operation,
                    principal = ctx.principal().name(),
                    tenant = %ctx.environment().tenant(),
                    required = %metadata.required,
                    reason = %reason,
                    "Operation denied"
                );
                Err(Error::InsufficientAuthority {
                    operation: operation.to_string(),
                    required: metadata.required,
                    granted: ctx.principal().granted_labels(),
                })
            },
        }
    }
}
