//! Notifications emitted after a transaction completes.

use super::repository::{RepositoryType, TenantId};
use super::transaction::{Activity, Transaction, TransactionId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Shared event metadata.
#[derive(Debug, Clone, Serialize)]
pub struct EventMeta {
    /// Unique identifier for this event.
    pub event_id: String,
    /// Optional correlation identifier (request id).
    pub correlation_id: Option<String>,
    /// Event source component.
    pub source: &'static str,
    /// Time the event was created.
    pub timestamp: DateTime<Utc>,
}

impl EventMeta {
    /// Creates new event metadata using the current time.
    #[must_use]
    pub fn new(source: &'static str, correlation_id: Option<String>) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            correlation_id,
            source,
            timestamp: Utc::now(),
        }
    }
}

/// Subjects touched by one activity kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivitySubjects {
    /// The activity.
    pub activity: Activity,
    /// Distinct subject identifiers.
    pub subjects: Vec<String>,
}

/// Read-only notification for one COMPLETED transaction.
///
/// Delivery (webhooks, queues) is the eventing collaborator's concern; the
/// core only produces this value after the commit returns.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionEvent {
    /// Event metadata.
    pub meta: EventMeta,
    /// The completed transaction.
    pub transaction_id: TransactionId,
    /// Tenant owning the target repository.
    pub tenant: TenantId,
    /// Type of the target repository.
    pub repository_type: RepositoryType,
    /// Acting principal.
    pub actor: String,
    /// Subjects per activity kind (empty groups omitted).
    pub activities: Vec<ActivitySubjects>,
    /// Time the transaction completed.
    pub completed_at: DateTime<Utc>,
}

impl TransactionEvent {
    /// Builds the notification for a completed transaction.
    ///
    /// Returns `None` unless the transaction is COMPLETED and bound to a
    /// target repository.
    #[must_use]
    pub fn from_transaction(
        transaction: &Transaction,
        correlation_id: Option<String>,
    ) -> Option<Self> {
        if !transaction.is_completed() {
            return None;
        }
        let target = transaction.target()?;
        let activities = [Activity::Inserted, Activity::Removed, Activity::Updated]
            .into_iter()
            .map(|activity| ActivitySubjects {
                activity,
                subjects: transaction.affected_subjects(&[activity]),
            })
            .filter(|group| !group.subjects.is_empty())
            .collect();

        Some(Self {
            meta: EventMeta::new("transactions", correlation_id),
            transaction_id: transaction.id(),
            tenant: target.tenant.clone(),
            repository_type: target.repository_type,
            actor: transaction.actor().to_string(),
            activities,
            completed_at: transaction.finished_at().unwrap_or_else(Utc::now),
        })
    }

    /// Returns the event type string.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        "transaction_completed"
    }

    /// Returns true if any activity touched `subject`.
    #[must_use]
    pub fn touches(&self, subject: &str) -> bool {
        self.activities
            .iter()
            .any(|group| group.subjects.iter().any(|s| s == subject))
    }

    /// Serializes the event as JSON for the eventing collaborator.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self).map_err(|e| crate::Error::OperationFailed {
            operation: "serialize_transaction_event".to_string(),
            cause: e.to_string(),
        })
    }
}
