//! Authority levels and principals.
//!
//! Authorities form a total order; holding a level implies every level below it.
//!
//! | Authority | Typical holder |
//! |-----------|----------------|
//! | `Reader` | Read-only clients |
//! | `User` | Contributors mutating entity data |
//! | `Application` | Tenant owners (reset, import) |
//! | `System` | Operators and scheduled jobs |
//!
//! # Example
//!
//! ```rust
//! use tenantgraph::security::{Authority, Principal};
//!
//! let alice = Principal::new("alice", [Authority::User]);
//! assert!(alice.satisfies(Authority::Reader));
//! assert!(!alice.satisfies(Authority::Application));
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Caller privilege level, ordered `Reader < User < Application < System`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Authority {
    /// Read access.
    Reader,
    /// Standard user: read and mutate entities.
    User,
    /// Tenant-level administration.
    Application,
    /// Full system access.
    System,
}

impl Authority {
    /// Returns all authorities in ascending order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Reader, Self::User, Self::Application, Self::System]
    }

    /// Returns the authority label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Reader => "READER",
            Self::User => "USER",
            Self::Application => "APPLICATION",
            Self::System => "SYSTEM",
        }
    }

    /// Parses an authority label (case-insensitive).
    ///
    /// Legacy labels `CONTRIBUTOR` and `MAINTAINER` map to `User`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "READER" => Some(Self::Reader),
            "USER" | "CONTRIBUTOR" | "MAINTAINER" => Some(Self::User),
            "APPLICATION" => Some(Self::Application),
            "SYSTEM" => Some(Self::System),
            _ => None,
        }
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns true if any granted authority reaches `required`.
///
/// This is the only comparison used for authority decisions.
#[must_use]
pub fn satisfies<'a>(
    required: Authority,
    granted: impl IntoIterator<Item = &'a Authority>,
) -> bool {
    granted.into_iter().any(|g| *g >= required)
}

/// Result of an access check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessResult {
    /// Access granted.
    Granted,
    /// Access denied with reason.
    Denied(String),
}

impl AccessResult {
    /// Returns true if access was granted.
    #[must_use]
    pub const fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }

    /// Returns true if access was denied.
    #[must_use]
    pub const fn is_denied(&self) -> bool {
        matches!(self, Self::Denied(_))
    }
}

/// Authenticated caller: a name and its granted authorities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    name: String,
    authorities: BTreeSet<Authority>,
}

impl Principal {
    /// Creates a principal with the given authorities.
    #[must_use]
    pub fn new(name: impl Into<String>, authorities: impl IntoIterator<Item = Authority>) -> Self {
        Self {
            name: name.into(),
            authorities: authorities.into_iter().collect(),
        }
    }

    /// Principal used by scheduled jobs and internal maintenance.
    #[must_use]
    pub fn system() -> Self {
        Self::new("system", [Authority::System])
    }

    /// Principal without any authority.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::new("anonymous", [])
    }

    /// Creates a principal from authority labels, ignoring unknown ones.
    #[must_use]
    pub fn from_labels<S: AsRef<str>>(name: impl Into<String>, labels: &[S]) -> Self {
        Self::new(
            name,
            labels.iter().filter_map(|l| Authority::parse(l.as_ref())),
        )
    }

    /// The principal's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Granted authorities.
    #[must_use]
    pub const fn authorities(&self) -> &BTreeSet<Authority> {
        &self.authorities
    }

    /// Highest granted authority, if any.
    #[must_use]
    pub fn highest(&self) -> Option<Authority> {
        self.authorities.last().copied()
    }

    /// Returns true if the principal reaches `required`.
    #[must_use]
    pub fn satisfies(&self, required: Authority) -> bool {
        satisfies(required, &self.authorities)
    }

    /// Checks access and returns a detailed result.
    #[must_use]
    pub fn check(&self, required: Authority) -> AccessResult {
        if self.satisfies(required) {
            AccessResult::Granted
        } else {
            AccessResult::Denied(format!(
                "principal '{}' holds [{}], requires {required}",
                self.name,
                self.granted_labels()
            ))
        }
    }

    /// Granted authorities as a comma-separated list.
    #[must_use]
    pub fn granted_labels(&self) -> String {
        self.authorities
            .iter()
            .map(Authority::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_total_order() {
        assert!(Authority::Reader < Authority::User);
        assert!(Authority::User < Authority::Application);
        assert!(Authority::Application < Authority::System);
    }

    #[test_case(Authority::Reader, Authority::Reader => true)]
    #[test_case(Authority::User, Authority::Reader => true)]
    #[test_case(Authority::User, Authority::Application => false)]
    #[test_case(Authority::Application, Authority::User => true)]
    #[test_case(Authority::Application, Authority::System => false)]
    #[test_case(Authority::System, Authority::Application => true)]
    fn test_satisfies_matrix(granted: Authority, required: Authority) -> bool {
        Principal::new("p", [granted]).satisfies(required)
    }

    #[test]
    fn test_anonymous_satisfies_nothing() {
        let anon = Principal::anonymous();
        for authority in Authority::all() {
            assert!(!anon.satisfies(*authority));
        }
        assert!(anon.highest().is_none());
    }

    #[test]
    fn test_check_reports_denial() {
        let result = Principal::new("bob", [Authority::User]).check(Authority::System);
        assert!(result.is_denied());
        assert_eq!(
            result,
            AccessResult::Denied("principal 'bob' holds [USER], requires SYSTEM".to_string())
        );
    }

    #[test]
    fn test_from_labels_maps_legacy_names() {
        let p = Principal::from_labels("carol", &["contributor", "guest"]);
        assert_eq!(p.highest(), Some(Authority::User));
        assert_eq!(p.authorities().len(), 1);
    }

    #[test]
    fn test_serde_labels() {
        let json = serde_json::to_string(&Authority::Application).unwrap();
        assert_eq!(json, "\"APPLICATION\"");
    }
}
