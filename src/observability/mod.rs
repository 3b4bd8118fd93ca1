//! Observability.
//!
//! Logging goes through `tracing`; counters and gauges through the `metrics`
//! facade (no exporter is installed here). Completion events travel on a
//! `tokio` broadcast [`EventBus`], routed to subscribers by [`EventScope`].
//!
//! | Metric | Kind | Emitted by |
//! |--------|------|------------|
//! | `repository_handles_built_total` | counter | registry |
//! | `repository_connections_open` | gauge per label | leases |
//! | `interceptor_denied_total` | counter | interceptor |
//! | `transactions_committed_total` | counter | transaction manager |
//! | `transactions_failed_total` | counter | transaction manager |
//! | `provenance_write_failed_total` | counter | entity service |
//! | `event_bus_publish_total` | counter per repository type | event bus |
//! | `event_bus_lagged_total` | counter | subscriptions |

mod event_bus;
mod logging;

pub use event_bus::{DEFAULT_EVENT_CAPACITY, EventBus, EventScope, EventSubscription};
pub use logging::{LogFormat, LoggingConfig};

use crate::{Error, Result};
use std::sync::OnceLock;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static LOGGING_INIT: OnceLock<()> = OnceLock::new();

/// Installs the global `tracing` subscriber.
///
/// # Errors
///
/// Returns an error if logging was already initialized in this process.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    if LOGGING_INIT.get().is_some() {
        return Err(Error::OperationFailed {
            operation: "logging_init".to_string(),
            cause: "logging already initialized".to_string(),
        });
    }

    match config.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_span_list(true)
                        .with_target(true),
                )
                .with(config.filter)
                .try_init()
                .map_err(init_error)?;
        },
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_thread_names(true),
                )
                .with(config.filter)
                .try_init()
                .map_err(init_error)?;
        },
    }

    LOGGING_INIT.set(()).map_err(|()| Error::OperationFailed {
        operation: "logging_init".to_string(),
        cause: "failed to mark logging initialized".to_string(),
    })
}

#[allow(clippy::needless_pass_by_value)]
fn init_error(e: tracing_subscriber::util::TryInitError) -> Error {
    Error::OperationFailed {
        operation: "logging_init".to_string(),
        cause: e.to_string(),
    }
}
