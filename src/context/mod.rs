//! Per-request session and environment context.
//!
//! A [`SessionContext`] carries the caller's [`Principal`] and the
//! [`Environment`] that routes the operation to a repository. The environment
//! is written only by the interceptor (`pub(crate)` setters); domain code
//! receives the context by shared reference once routing is resolved.
//!
//! Contexts belong to one logical request and are never shared across
//! concurrent requests.

use crate::models::{RepositoryFlags, RepositoryKey, RepositoryType, TenantId};
use crate::security::Principal;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Details of the inbound request, absent for scheduled jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDetails {
    request_id: String,
    received_at: DateTime<Utc>,
}

impl RequestDetails {
    /// Creates request details with a generated id.
    #[must_use]
    pub fn new() -> Self {
        Self::from_id(Uuid::new_v4().to_string())
    }

    /// Creates request details with an existing request id.
    #[must_use]
    pub fn from_id(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            received_at: Utc::now(),
        }
    }

    /// Returns the request id.
    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Time the request was received.
    #[must_use]
    pub const fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }
}

impl Default for RequestDetails {
    fn default() -> Self {
        Self::new()
    }
}

/// Routing target of one operation.
///
/// Authorization is not copied: a clone must pass the interceptor again.
#[derive(Debug, PartialEq, Eq)]
pub struct Environment {
    tenant: TenantId,
    stage: Option<String>,
    repository_type: Option<RepositoryType>,
    flags: RepositoryFlags,
    authorized: bool,
}

impl Clone for Environment {
    fn clone(&self) -> Self {
        Self {
            tenant: self.tenant.clone(),
            stage: self.stage.clone(),
            repository_type: self.repository_type,
            flags: self.flags,
            authorized: false,
        }
    }
}

impl Environment {
    /// Creates an unresolved environment for `tenant`.
    #[must_use]
    pub const fn new(tenant: TenantId) -> Self {
        Self {
            tenant,
            stage: None,
            repository_type: None,
            flags: RepositoryFlags {
                persistent: false,
                public: false,
            },
            authorized: false,
        }
    }

    /// Target tenant.
    #[must_use]
    pub const fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// Deployment stage, if any.
    #[must_use]
    pub fn stage(&self) -> Option<&str> {
        self.stage.as_deref()
    }

    /// Resolved repository type; `None` until the interceptor ran.
    #[must_use]
    pub const fn repository_type(&self) -> Option<RepositoryType> {
        self.repository_type
    }

    /// Storage flags for the resolved repository type.
    #[must_use]
    pub const fn flags(&self) -> RepositoryFlags {
        self.flags
    }

    /// Returns true once the interceptor granted the current operation.
    #[must_use]
    pub const fn is_authorized(&self) -> bool {
        self.authorized
    }

    /// Registry key of the resolved repository.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unauthorized`] if the environment never passed the
    /// interceptor, or [`Error::MissingRepositoryDeclaration`] if no
    /// repository type was resolved.
    pub fn repository_key(&self) -> Result<RepositoryKey> {
        if !self.authorized {
            return Err(Error::Unauthorized(format!(
                "environment for tenant '{}' was not authorized",
                self.tenant
            )));
        }
        let repository_type =
            self.repository_type
                .ok_or_else(|| Error::MissingRepositoryDeclaration {
                    operation: "resolve_repository".to_string(),
                })?;
        let key = RepositoryKey::new(self.tenant.clone(), repository_type);
        Ok(match self.stage {
            Some(ref stage) => key.with_stage(stage),
            None => key,
        })
    }

    pub(crate) const fn bind(&mut self, repository_type: RepositoryType, flags: RepositoryFlags) {
        self.repository_type = Some(repository_type);
        self.flags = flags;
        self.authorized = false;
    }

    pub(crate) const fn set_authorized(&mut self, authorized: bool) {
        self.authorized = authorized;
    }
}

/// Per-request carrier of identity and routing target.
#[derive(Debug, Clone)]
pub struct SessionContext {
    principal: Principal,
    environment: Environment,
    request: Option<RequestDetails>,
}

impl SessionContext {
    /// Creates a context for `principal` targeting `tenant`.
    #[must_use]
    pub const fn new(principal: Principal, tenant: TenantId) -> Self {
        Self {
            principal,
            environment: Environment::new(tenant),
            request: None,
        }
    }

    /// Context for scheduled jobs: SYSTEM principal, no request details.
    #[must_use]
    pub fn system(tenant: TenantId) -> Self {
        Self::new(Principal::system(), tenant)
    }

    /// Attaches inbound request details.
    #[must_use]
    pub fn with_request(mut self, request: RequestDetails) -> Self {
        self.request = Some(request);
        self
    }

    /// Sets the deployment stage of the target repositories.
    #[must_use]
    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.environment.stage = Some(stage.into());
        self
    }

    /// The authenticated caller.
    #[must_use]
    pub const fn principal(&self) -> &Principal {
        &self.principal
    }

    /// The routing environment.
    #[must_use]
    pub const fn environment(&self) -> &Environment {
        &self.environment
    }

    pub(crate) const fn environment_mut(&mut self) -> &mut Environment {
        &mut self.environment
    }

    /// Inbound request details, if any.
    #[must_use]
    pub const fn request(&self) -> Option<&RequestDetails> {
        self.request.as_ref()
    }

    /// Request id used as correlation id in events and logs.
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.request.as_ref().map(RequestDetails::request_id)
    }

    /// Returns true for contexts without an inbound request.
    #[must_use]
    pub const fn is_scheduled(&self) -> bool {
        self.request.is_none()
    }
}
