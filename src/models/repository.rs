//! Tenant and repository identity types.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a tenant ("application") owning its own repositories.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Creates a tenant identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates a tenant identifier, rejecting blank input.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `id` is empty or whitespace.
    pub fn parse(id: &str) -> Result<Self> {
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("tenant id must not be empty".to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Tenant used for repositories shared by the whole system.
    #[must_use]
    pub fn system() -> Self {
        Self("system".to_string())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Logical role of a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryType {
    /// Entity data.
    Entities,
    /// Tenant (application) metadata.
    Application,
    /// Transaction provenance log.
    Transactions,
    /// Vocabularies and schema.
    Schema,
}

impl RepositoryType {
    /// Returns all repository types.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Entities,
            Self::Application,
            Self::Transactions,
            Self::Schema,
        ]
    }

    /// Returns the type as a lowercase string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Entities => "entities",
            Self::Application => "application",
            Self::Transactions => "transactions",
            Self::Schema => "schema",
        }
    }

    /// Parses a repository type (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "entities" => Some(Self::Entities),
            "application" | "applications" | "tenant" => Some(Self::Application),
            "transactions" => Some(Self::Transactions),
            "schema" | "vocabularies" => Some(Self::Schema),
            _ => None,
        }
    }
}

impl fmt::Display for RepositoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry key: one repository per (tenant, type, stage).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepositoryKey {
    /// Owning tenant.
    pub tenant: TenantId,
    /// Repository role.
    pub repository_type: RepositoryType,
    /// Optional deployment stage (e.g. "test").
    pub stage: Option<String>,
}

impl RepositoryKey {
    /// Creates a key without a stage.
    #[must_use]
    pub const fn new(tenant: TenantId, repository_type: RepositoryType) -> Self {
        Self {
            tenant,
            repository_type,
            stage: None,
        }
    }

    /// Sets the stage.
    #[must_use]
    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    /// Human-readable label: `{type}_{tenant}[_{stage}]`. Diagnostics only.
    ///
    /// `_` and `%` inside the tenant or stage are written as `%5F` and `%25`,
    /// so distinct keys never share a label.
    #[must_use]
    pub fn label(&self) -> String {
        let mut label = format!("{}_", self.repository_type);
        push_escaped(&mut label, self.tenant.as_str());
        if let Some(ref stage) = self.stage
            && !stage.is_empty()
        {
            label.push('_');
            push_escaped(&mut label, stage);
        }
        label
    }
}

fn push_escaped(label: &mut String, part: &str) {
    for c in part.chars() {
        match c {
            '_' => label.push_str("%5F"),
            '%' => label.push_str("%25"),
            c => label.push(c),
        }
    }
}

impl fmt::Display for RepositoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Storage flags resolved per repository type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RepositoryFlags {
    /// Whether the backend should persist content across restarts.
    #[serde(default)]
    pub persistent: bool,
    /// Whether content is readable without tenant membership.
    #[serde(default)]
    pub public: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_format() {
        let key = RepositoryKey::new(TenantId::new("acme"), RepositoryType::Entities);
        assert_eq!(key.label(), "entities_acme");
        assert_eq!(key.with_stage("test").label(), "entities_acme_test");
    }

    #[test]
    fn test_label_separates_tenant_from_stage() {
        let key =
            |tenant: &str| RepositoryKey::new(TenantId::new(tenant), RepositoryType::Entities);
        assert_eq!(key("a_b").label(), "entities_a%5Fb");
        assert_eq!(key("a").with_stage("b").label(), "entities_a_b");

        let tricky = key("a_").with_stage("b");
        let other = key("a").with_stage("_b");
        assert_ne!(tricky.label(), other.label());
        assert_eq!(
            RepositoryKey::new(TenantId::new("50%"), RepositoryType::Schema).label(),
            "schema_50%25"
        );
    }

    #[test]
    fn test_repository_type_parse_roundtrip() {
        for ty in RepositoryType::all() {
            assert_eq!(RepositoryType::parse(ty.as_str()), Some(*ty));
        }
        assert_eq!(RepositoryType::parse("SCHEMA"), Some(RepositoryType::Schema));
        assert_eq!(RepositoryType::parse("unknown"), None);
    }

    #[test]
    fn test_tenant_parse_rejects_blank() {
        assert!(TenantId::parse("  ").is_err());
        assert_eq!(TenantId::parse(" acme ").unwrap().as_str(), "acme");
    }
}
