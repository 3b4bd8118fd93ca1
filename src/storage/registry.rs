//! Repository registry.
//!
//! Owns one [`RepositoryHandle`] per [`RepositoryKey`]. Handles are built
//! lazily through a pluggable [`RepositoryBuilder`] the first time a key is
//! resolved, and every checkout hands out a [`ConnectionLease`] that releases
//! its connection when dropped.
//!
//! # Handle lifecycle
//!
//! | Status | Meaning |
//! |--------|---------|
//! | `Active` | Connections are open or were open recently |
//! | `Idle` | No connections for `idle_after` |
//! | `Evicted` | Idle for a further `evict_after`; dropped from the registry |
//!
//! Only persistent repositories are evicted. A volatile repository would lose
//! its content, so it stays `Idle` until reset or shut down.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tenantgraph::config::RegistryConfig;
//! use tenantgraph::storage::{InMemoryRepositoryBuilder, RepositoryRegistry};
//!
//! let registry = RepositoryRegistry::new(
//!     Arc::new(InMemoryRepositoryBuilder::new()),
//!     RegistryConfig::default(),
//! );
//! let handle = registry.resolve(ctx.environment())?;
//! let lease = registry.checkout(&handle)?;
//! let store = lease.store();
//! ```

use super::traits::{GraphStore, GraphStoreExt};
use crate::config::RegistryConfig;
use crate::context::Environment;
use crate::models::{RepositoryFlags, RepositoryKey};
use crate::security::{Authority, satisfies};
use crate::{Error, Result, lock_poisoned};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Builds the backing engine for a repository.
///
/// # Implementor Notes
///
/// - Called at most once per key while the handle is alive
/// - A failure leaves the registry usable; the next resolve retries
pub trait RepositoryBuilder: Send + Sync {
    /// Builds the engine for `key` with the resolved storage flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached or initialized.
    fn build(&self, key: &RepositoryKey, flags: RepositoryFlags) -> Result<Arc<dyn GraphStore>>;
}

/// Lifecycle status of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryStatus {
    /// In use.
    Active,
    /// Unused for a while.
    Idle,
    /// Dropped from the registry.
    Evicted,
}

impl RepositoryStatus {
    /// Returns the status as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Idle => "idle",
            Self::Evicted => "evicted",
        }
    }
}

impl fmt::Display for RepositoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
struct Usage {
    status: RepositoryStatus,
    since: Instant,
}

/// One repository owned by the registry.
pub struct RepositoryHandle {
    key: RepositoryKey,
    label: String,
    flags: RepositoryFlags,
    store: Arc<dyn GraphStore>,
    connections: AtomicUsize,
    shut_down: AtomicBool,
    engine_closed: AtomicBool,
    created_at: DateTime<Utc>,
    activity: Mutex<Usage>,
}

impl fmt::Debug for RepositoryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryHandle")
            .field("label", &self.label)
            .field("connections", &self.open_connections())
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

impl RepositoryHandle {
    fn new(key: RepositoryKey, flags: RepositoryFlags, store: Arc<dyn GraphStore>) -> Self {
        Self {
            label: key.label(),
            key,
            flags,
            store,
            connections: AtomicUsize::new(0),
            shut_down: AtomicBool::new(false),
            engine_closed: AtomicBool::new(false),
            created_at: Utc::now(),
            activity: Mutex::new(Usage {
                status: RepositoryStatus::Active,
                since: Instant::now(),
            }),
        }
    }

    /// Registry key of the repository.
    #[must_use]
    pub const fn key(&self) -> &RepositoryKey {
        &self.key
    }

    /// Diagnostic label, `{type}_{tenant}[_{stage}]`.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Storage flags the engine was built with.
    #[must_use]
    pub const fn flags(&self) -> RepositoryFlags {
        self.flags
    }

    /// Time the handle was built.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Number of leases currently checked out.
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.connections.load(Ordering::Acquire)
    }

    /// Returns true once the handle was shut down or evicted.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Current lifecycle status.
    #[must_use]
    pub fn status(&self) -> RepositoryStatus {
        self.activity
            .lock()
            .map_or(RepositoryStatus::Active, |activity| activity.status)
    }

    /// Checks out a connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RepositoryUnavailable`] if the handle was shut down.
    pub fn checkout(self: &Arc<Self>) -> Result<ConnectionLease> {
        if self.is_shut_down() {
            return Err(self.unavailable());
        }
        let open = self.connections.fetch_add(1, Ordering::AcqRel) + 1;
        // Shutdown may have landed between the check and the increment.
        if self.is_shut_down() {
            self.release_connection();
            return Err(self.unavailable());
        }
        self.touch(RepositoryStatus::Active);
        metrics::gauge!("repository_connections_open", "label" => self.label.clone())
            .set(open as f64);
        Ok(ConnectionLease {
            handle: Arc::clone(self),
            released: false,
        })
    }

    fn unavailable(&self) -> Error {
        Error::RepositoryUnavailable {
            label: self.label.clone(),
        }
    }

    fn touch(&self, status: RepositoryStatus) {
        if let Ok(mut activity) = self.activity.lock() {
            activity.status = status;
            activity.since = Instant::now();
        }
    }

    fn release_connection(&self) {
        let previous = self.connections.fetch_sub(1, Ordering::AcqRel);
        let open = previous.saturating_sub(1);
        metrics::gauge!("repository_connections_open", "label" => self.label.clone())
            .set(open as f64);
        if open == 0 {
            if self.is_shut_down() {
                self.close_engine();
            } else {
                self.touch(RepositoryStatus::Active);
            }
        }
    }

    /// Marks the handle unusable; the engine closes once the last lease is gone.
    fn invalidate(&self, status: RepositoryStatus) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Ok(mut activity) = self.activity.lock() {
            activity.status = status;
        }
        if self.open_connections() == 0 {
            self.close_engine();
        }
    }

    fn close_engine(&self) {
        if self.engine_closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let Some(maintain) = self.store.as_maintainable() else {
            return;
        };
        match maintain.shutdown() {
            Ok(()) => tracing::debug!(label = %self.label, "Closed repository engine"),
            Err(e) => {
                tracing::warn!(
                    label = %self.label,
                    error = %e,
                    "Repository engine shutdown failed"
                );
            },
        }
    }
}

/// Scoped connection to a repository.
///
/// The connection is released on drop; [`release`](Self::release) may be
/// called earlier and any further release is a no-op.
pub struct ConnectionLease {
    handle: Arc<RepositoryHandle>,
    released: bool,
}

impl fmt::Debug for ConnectionLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionLease")
            .field("label", &self.handle.label)
            .field("released", &self.released)
            .finish()
    }
}

impl ConnectionLease {
    /// The engine behind the lease.
    #[must_use]
    pub fn store(&self) -> &dyn GraphStore {
        self.handle.store.as_ref()
    }

    /// The handle the lease was checked out from.
    #[must_use]
    pub const fn handle(&self) -> &Arc<RepositoryHandle> {
        &self.handle
    }

    /// Returns true once the connection was released.
    #[must_use]
    pub const fn is_released(&self) -> bool {
        self.released
    }

    /// Releases the connection.
    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.handle.release_connection();
        }
    }
}

impl Drop for ConnectionLease {
    fn drop(&mut self) {
        self.release();
    }
}

/// Diagnostic snapshot of one handle.
#[derive(Debug, Clone)]
pub struct RepositoryDiagnostics {
    /// Diagnostic label.
    pub label: String,
    /// Registry key.
    pub key: RepositoryKey,
    /// Lifecycle status.
    pub status: RepositoryStatus,
    /// Leases currently checked out.
    pub connections: usize,
    /// Time the handle was built.
    pub created_at: DateTime<Utc>,
}

type Slot = Arc<Mutex<Option<Arc<RepositoryHandle>>>>;

/// Owns one repository handle per (tenant, type, stage).
pub struct RepositoryRegistry {
    builder: Arc<dyn RepositoryBuilder>,
    config: RegistryConfig,
    slots: RwLock<HashMap<RepositoryKey, Slot>>,
}

impl fmt::Debug for RepositoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handles = self.slots.read().map_or(0, |slots| slots.len());
        f.debug_struct("RepositoryRegistry")
            .field("config", &self.config)
            .field("keys", &handles)
            .finish_non_exhaustive()
    }
}

impl RepositoryRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(builder: Arc<dyn RepositoryBuilder>, config: RegistryConfig) -> Self {
        Self {
            builder,
            config,
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Registry settings.
    #[must_use]
    pub const fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Resolves the repository an authorized environment points at.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unauthorized`] if the environment never passed the
    /// interceptor, or [`Error::RepositoryBuildFailure`] if the engine could
    /// not be built.
    pub fn resolve(&self, environment: &Environment) -> Result<Arc<RepositoryHandle>> {
        let key = environment.repository_key()?;
        self.resolve_key(&key, environment.flags())
    }

    /// Returns the handle for `key`, building it on first access.
    ///
    /// Concurrent first accesses to the same key yield the same handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RepositoryBuildFailure`] if the engine could not be built.
    pub fn resolve_key(
        &self,
        key: &RepositoryKey,
        flags: RepositoryFlags,
    ) -> Result<Arc<RepositoryHandle>> {
        let slot = self.slot(key)?;
        let mut current = slot
            .lock()
            .map_err(|_| lock_poisoned("resolve_repository"))?;
        if let Some(handle) = current.as_ref() {
            return Ok(Arc::clone(handle));
        }

        let label = key.label();
        let store = self.builder.build(key, flags).map_err(|e| match e {
            e @ Error::RepositoryBuildFailure { .. } => e,
            other => Error::RepositoryBuildFailure {
                label: label.clone(),
                cause: other.to_string(),
            },
        })?;

        let handle = Arc::new(RepositoryHandle::new(key.clone(), flags, store));
        *current = Some(Arc::clone(&handle));
        metrics::counter!(
            "repository_handles_built_total",
            "repository_type" => key.repository_type.as_str()
        )
        .increment(1);
        tracing::info!(
            label = %label,
            tenant = %key.tenant,
            repository_type = %key.repository_type,
            persistent = flags.persistent,
            "Built repository handle"
        );
        Ok(handle)
    }

    fn slot(&self, key: &RepositoryKey) -> Result<Slot> {
        {
            let slots = self
                .slots
                .read()
                .map_err(|_| lock_poisoned("resolve_repository"))?;
            if let Some(slot) = slots.get(key) {
                return Ok(Arc::clone(slot));
            }
        }
        let mut slots = self
            .slots
            .write()
            .map_err(|_| lock_poisoned("resolve_repository"))?;
        Ok(Arc::clone(slots.entry(key.clone()).or_default()))
    }

    fn current(&self, key: &RepositoryKey) -> Result<Option<Arc<RepositoryHandle>>> {
        let slots = self.slots.read().map_err(|_| lock_poisoned("lookup_repository"))?;
        let Some(slot) = slots.get(key) else {
            return Ok(None);
        };
        let current = slot.lock().map_err(|_| lock_poisoned("lookup_repository"))?;
        Ok(current.clone())
    }

    /// Returns the live handle for `key` without building one.
    ///
    /// # Errors
    ///
    /// Returns an error if a registry lock is poisoned.
    pub fn get(&self, key: &RepositoryKey) -> Result<Option<Arc<RepositoryHandle>>> {
        self.current(key)
    }

    /// Checks out a connection from `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RepositoryUnavailable`] if the handle was shut down.
    pub fn checkout(&self, handle: &Arc<RepositoryHandle>) -> Result<ConnectionLease> {
        handle.checkout()
    }

    /// Purges all content of the environment's repository.
    ///
    /// The handle survives; later checkouts reuse it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InsufficientAuthority`] if `granted` does not reach
    /// `required`, or an error from resolving or purging the repository.
    pub fn reset<'a>(
        &self,
        environment: &Environment,
        granted: impl IntoIterator<Item = &'a Authority> + Clone,
        required: Authority,
    ) -> Result<()> {
        if !satisfies(required, granted.clone()) {
            let granted = granted
                .into_iter()
                .map(Authority::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            return Err(Error::InsufficientAuthority {
                operation: "reset".to_string(),
                required,
                granted,
            });
        }

        let handle = self.resolve(environment)?;
        let lease = handle.checkout()?;
        lease.store().maintainable()?.purge()?;
        tracing::info!(label = %handle.label(), "Reset repository");
        Ok(())
    }

    /// Shuts down the handle for `key`.
    ///
    /// In-flight leases complete; new checkouts on the handle fail with
    /// [`Error::RepositoryUnavailable`]. A later resolve builds a new handle.
    /// Returns false if no handle was live.
    ///
    /// # Errors
    ///
    /// Returns an error if a registry lock is poisoned.
    pub fn shutdown(&self, key: &RepositoryKey) -> Result<bool> {
        let Some(handle) = self.take(key)? else {
            return Ok(false);
        };
        let open = handle.open_connections();
        handle.invalidate(RepositoryStatus::Evicted);
        tracing::info!(label = %handle.label(), open_connections = open, "Shut down repository");
        Ok(true)
    }

    fn take(&self, key: &RepositoryKey) -> Result<Option<Arc<RepositoryHandle>>> {
        let slots = self.slots.read().map_err(|_| lock_poisoned("shutdown_repository"))?;
        let Some(slot) = slots.get(key) else {
            return Ok(None);
        };
        let mut current = slot.lock().map_err(|_| lock_poisoned("shutdown_repository"))?;
        Ok(current.take())
    }

    /// Shuts down every handle, warning about leases still checked out.
    ///
    /// Returns the number of handles closed.
    ///
    /// # Errors
    ///
    /// Returns an error if a registry lock is poisoned.
    pub fn shutdown_all(&self) -> Result<usize> {
        let slots: Vec<Slot> = self
            .slots
            .read()
            .map_err(|_| lock_poisoned("shutdown_all"))?
            .values()
            .cloned()
            .collect();

        let mut closed = 0;
        for slot in slots {
            let taken = slot.lock().map_err(|_| lock_poisoned("shutdown_all"))?.take();
            let Some(handle) = taken else {
                continue;
            };
            let open = handle.open_connections();
            if open > 0 {
                tracing::warn!(
                    label = %handle.label(),
                    open_connections = open,
                    "Repository shut down with leases still checked out"
                );
            }
            handle.invalidate(RepositoryStatus::Evicted);
            closed += 1;
        }
        tracing::info!(closed, "Shut down all repositories");
        Ok(closed)
    }

    /// Advances handle statuses and evicts persistent handles idle for too long.
    ///
    /// Returns the number of handles evicted.
    ///
    /// # Errors
    ///
    /// Returns an error if a registry lock is poisoned.
    pub fn sweep(&self) -> Result<usize> {
        let slots: Vec<Slot> = self
            .slots
            .read()
            .map_err(|_| lock_poisoned("sweep"))?
            .values()
            .cloned()
            .collect();

        let mut evicted = 0;
        for slot in slots {
            let mut current = slot.lock().map_err(|_| lock_poisoned("sweep"))?;
            let Some(handle) = current.as_ref() else {
                continue;
            };
            if handle.open_connections() > 0 {
                handle.touch(RepositoryStatus::Active);
                continue;
            }

            let activity = *handle.activity.lock().map_err(|_| lock_poisoned("sweep"))?;
            let elapsed = activity.since.elapsed();
            match activity.status {
                RepositoryStatus::Active if elapsed >= self.config.idle_after => {
                    handle.touch(RepositoryStatus::Idle);
                    tracing::debug!(label = %handle.label(), "Repository idle");
                },
                RepositoryStatus::Idle
                    if handle.flags.persistent && elapsed >= self.config.evict_after =>
                {
                    if let Some(handle) = current.take() {
                        handle.invalidate(RepositoryStatus::Evicted);
                        tracing::info!(label = %handle.label(), "Evicted idle repository");
                        evicted += 1;
                    }
                },
                _ => {},
            }
        }
        Ok(evicted)
    }

    /// Runs [`sweep`](Self::sweep) on the configured interval.
    ///
    /// The task ends once the registry is dropped.
    #[must_use]
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let registry: Weak<Self> = Arc::downgrade(self);
        let period = self
            .config
            .sweep_interval
            .max(std::time::Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                if let Err(e) = registry.sweep() {
                    tracing::warn!(error = %e, "Repository sweep failed");
                }
            }
        })
    }

    /// Snapshot of every live handle, sorted by label.
    ///
    /// # Errors
    ///
    /// Returns an error if a registry lock is poisoned.
    pub fn diagnostics(&self) -> Result<Vec<RepositoryDiagnostics>> {
        let slots = self.slots.read().map_err(|_| lock_poisoned("diagnostics"))?;
        let mut report = Vec::with_capacity(slots.len());
        for slot in slots.values() {
            let current = slot.lock().map_err(|_| lock_poisoned("diagnostics"))?;
            if let Some(handle) = current.as_ref() {
                report.push(RepositoryDiagnostics {
                    label: handle.label.clone(),
                    key: handle.key.clone(),
                    status: handle.status(),
                    connections: handle.open_connections(),
                    created_at: handle.created_at,
                });
            }
        }
        report.sort_by(|a, b| a.label.cmp(&b.label));
        Ok(report)
    }
}
