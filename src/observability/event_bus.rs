//! Completion events routed by tenant and repository type.
//!
//! The transaction manager publishes one [`TransactionEvent`] per completed
//! commit. A subscriber names the slice of traffic it wants with an
//! [`EventScope`]; events outside the scope never reach it.
//!
//! ```rust,ignore
//! let scope = EventScope::tenant(TenantId::new("acme")).of_type(RepositoryType::Entities);
//! let mut acme = bus.subscribe(scope);
//! let event = acme.recv().await?;
//! ```

use crate::models::{RepositoryType, TenantId, TransactionEvent};
use crate::{Error, Result};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

/// Buffer size used when none is configured.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Which events a subscription receives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventScope {
    tenant: Option<TenantId>,
    repository_type: Option<RepositoryType>,
}

impl EventScope {
    /// Every event.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            tenant: None,
            repository_type: None,
        }
    }

    /// Events of one tenant.
    #[must_use]
    pub const fn tenant(tenant: TenantId) -> Self {
        Self {
            tenant: Some(tenant),
            repository_type: None,
        }
    }

    /// Narrows the scope to one repository type.
    #[must_use]
    pub fn of_type(mut self, repository_type: RepositoryType) -> Self {
        self.repository_type = Some(repository_type);
        self
    }

    /// Returns true if `event` falls inside the scope.
    #[must_use]
    pub fn matches(&self, event: &TransactionEvent) -> bool {
        self.tenant.as_ref().is_none_or(|t| *t == event.tenant)
            && self.repository_type.is_none_or(|ty| ty == event.repository_type)
    }
}

/// Broadcasts completion events to scoped subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<TransactionEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBus {
    /// Creates a bus buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes `event`, returning how many subscriptions it was queued for.
    ///
    /// Publishing with no subscribers drops the event.
    pub fn publish(&self, event: TransactionEvent) -> usize {
        metrics::counter!(
            "event_bus_publish_total",
            "repository_type" => event.repository_type.as_str()
        )
        .increment(1);
        match self.sender.send(event) {
            Ok(queued) => queued,
            Err(broadcast::error::SendError(event)) => {
                tracing::trace!(transaction_id = %event.transaction_id, "No event subscribers");
                0
            },
        }
    }

    /// Subscribes to the events inside `scope`.
    #[must_use]
    pub fn subscribe(&self, scope: EventScope) -> EventSubscription {
        EventSubscription {
            receiver: self.sender.subscribe(),
            scope,
        }
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Receiving end of a scoped subscription.
#[derive(Debug)]
pub struct EventSubscription {
    receiver: broadcast::Receiver<TransactionEvent>,
    scope: EventScope,
}

impl EventSubscription {
    /// The scope this subscription was opened with.
    #[must_use]
    pub const fn scope(&self) -> &EventScope {
        &self.scope
    }

    /// Waits for the next event inside the scope.
    ///
    /// A subscriber that falls behind skips the overwritten events.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] once every bus handle is dropped.
    pub async fn recv(&mut self) -> Result<TransactionEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.scope.matches(&event) => return Ok(event),
                Ok(_) => {},
                Err(RecvError::Lagged(skipped)) => lagged(skipped),
                Err(RecvError::Closed) => return Err(closed()),
            }
        }
    }

    /// Returns the next buffered event inside the scope without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] once every bus handle is dropped.
    pub fn try_recv(&mut self) -> Result<Option<TransactionEvent>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.scope.matches(&event) => return Ok(Some(event)),
                Ok(_) => {},
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Lagged(skipped)) => lagged(skipped),
                Err(TryRecvError::Closed) => return Err(closed()),
            }
        }
    }
}

fn lagged(skipped: u64) {
    metrics::counter!("event_bus_lagged_total").increment(skipped);
    tracing::warn!(skipped, "Event subscriber lagged");
}

fn closed() -> Error {
    Error::OperationFailed {
        operation: "receive_event".to_string(),
        cause: "event bus closed".to_string(),
    }
}
