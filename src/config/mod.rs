//! Configuration management.
//!
//! [`GraphConfig`] is assembled from defaults, an optional TOML file, and
//! `TENANTGRAPH_*` environment overrides, in that order.
//!
//! ```toml
//! [storage.entities]
//! persistent = true
//!
//! [registry]
//! idle_after_secs = 60
//! evict_after_secs = 120
//!
//! [logging]
//! format = "json"
//! filter = "tenantgraph=debug"
//! ```

use crate::models::{RepositoryFlags, RepositoryType};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Main configuration.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// Storage flags per repository type.
    pub storage: StorageConfig,
    /// Repository registry settings.
    pub registry: RegistryConfig,
    /// Transaction manager settings.
    pub transactions: TransactionConfig,
    /// Event bus buffer capacity.
    pub event_capacity: usize,
    /// Logging settings, resolved by [`GraphConfig::logging_config`].
    pub logging: LoggingSettings,
}

/// Storage flags per repository type.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    flags: HashMap<RepositoryType, RepositoryFlags>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let flags = RepositoryType::all()
            .iter()
            .map(|ty| {
                let public = matches!(ty, RepositoryType::Schema);
                (
                    *ty,
                    RepositoryFlags {
                        persistent: false,
                        public,
                    },
                )
            })
            .collect();
        Self { flags }
    }
}

impl StorageConfig {
    /// Flags for a repository type.
    #[must_use]
    pub fn flags_for(&self, repository_type: RepositoryType) -> RepositoryFlags {
        self.flags
            .get(&repository_type)
            .copied()
            .unwrap_or_default()
    }

    /// Overrides the flags for a repository type.
    #[must_use]
    pub fn with_flags(mut self, repository_type: RepositoryType, flags: RepositoryFlags) -> Self {
        self.flags.insert(repository_type, flags);
        self
    }
}

/// Repository registry settings.
#[derive(Debug, Clone, Copy)]
pub struct RegistryConfig {
    /// Time without connections before an ACTIVE handle turns IDLE.
    pub idle_after: Duration,
    /// Time spent IDLE before a handle is EVICTED.
    pub evict_after: Duration,
    /// Interval between status sweeps.
    pub sweep_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            idle_after: Duration::from_secs(60),
            evict_after: Duration::from_secs(120),
            sweep_interval: Duration::from_millis(500),
        }
    }
}

/// Transaction manager settings.
#[derive(Debug, Clone, Copy)]
pub struct TransactionConfig {
    /// Number of committed transaction ids remembered for duplicate rejection.
    pub ledger_capacity: usize,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            ledger_capacity: 10_000,
        }
    }
}

/// Logging section as read from the config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingSettings {
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// Env-filter directive, e.g. `tenantgraph=debug`.
    pub filter: Option<String>,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Storage flags keyed by repository type name.
    pub storage: Option<HashMap<String, ConfigFileFlags>>,
    /// Registry section.
    pub registry: Option<ConfigFileRegistry>,
    /// Transactions section.
    pub transactions: Option<ConfigFileTransactions>,
    /// Events section.
    pub events: Option<ConfigFileEvents>,
    /// Logging section.
    pub logging: Option<LoggingSettings>,
}

/// Storage flags in the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileFlags {
    /// Persist content.
    pub persistent: Option<bool>,
    /// Publicly readable.
    pub public: Option<bool>,
}

/// Registry section in the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileRegistry {
    /// Seconds before an unused handle turns idle.
    pub idle_after_secs: Option<u64>,
    /// Seconds an idle handle waits before eviction.
    pub evict_after_secs: Option<u64>,
    /// Sweep interval in milliseconds.
    pub sweep_interval_ms: Option<u64>,
}

/// Transactions section in the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileTransactions {
    /// Ledger capacity.
    pub ledger_capacity: Option<usize>,
}

/// Events section in the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileEvents {
    /// Broadcast buffer capacity.
    pub capacity: Option<usize>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            registry: RegistryConfig::default(),
            transactions: TransactionConfig::default(),
            event_capacity: crate::observability::DEFAULT_EVENT_CAPACITY,
            logging: LoggingSettings::default(),
        }
    }
}

impl GraphConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or names an
    /// unknown repository type.
    pub fn load_from_file(path: &std::path::Path) -> crate::Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| crate::Error::OperationFailed {
                operation: "read_config_file".to_string(),
                cause: e.to_string(),
            })?;

        Self::from_toml(&contents)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML for [`ConfigFile`] or
    /// names an unknown repository type.
    pub fn from_toml(contents: &str) -> crate::Result<Self> {
        let file: ConfigFile =
            toml::from_str(contents).map_err(|e| crate::Error::OperationFailed {
                operation: "parse_config_file".to_string(),
                cause: e.to_string(),
            })?;

        Self::from_config_file(file)
    }

    /// Loads configuration from the default location, then applies env overrides.
    ///
    /// Looks for `tenantgraph/config.toml` in the platform config directory and
    /// falls back to defaults when it is missing or unreadable.
    #[must_use]
    pub fn load_default() -> Self {
        let from_file = directories::ProjectDirs::from("", "", "tenantgraph")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .filter(|path| path.exists())
            .and_then(|path| match Self::load_from_file(&path) {
                Ok(config) => Some(config),
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Ignoring unreadable config file"
                    );
                    None
                },
            });

        from_file.unwrap_or_default().with_env_overrides()
    }

    /// Converts a `ConfigFile` to `GraphConfig`.
    fn from_config_file(file: ConfigFile) -> crate::Result<Self> {
        let mut config = Self::default();

        if let Some(storage) = file.storage {
            for (name, flags) in storage {
                let repository_type = RepositoryType::parse(&name).ok_or_else(|| {
                    crate::Error::InvalidInput(format!("unknown repository type '{name}'"))
                })?;
                let mut resolved = config.storage.flags_for(repository_type);
                if let Some(v) = flags.persistent {
                    resolved.persistent = v;
                }
                if let Some(v) = flags.public {
                    resolved.public = v;
                }
                config.storage = config.storage.with_flags(repository_type, resolved);
            }
        }
        if let Some(registry) = file.registry {
            if let Some(secs) = registry.idle_after_secs {
                config.registry.idle_after = Duration::from_secs(secs);
            }
            if let Some(secs) = registry.evict_after_secs {
                config.registry.evict_after = Duration::from_secs(secs);
            }
            if let Some(ms) = registry.sweep_interval_ms {
                config.registry.sweep_interval = Duration::from_millis(ms.max(1));
            }
        }
        if let Some(capacity) = file.transactions.and_then(|t| t.ledger_capacity) {
            config.transactions.ledger_capacity = capacity.max(1);
        }
        if let Some(capacity) = file.events.and_then(|e| e.capacity) {
            config.event_capacity = capacity.max(1);
        }
        if let Some(logging) = file.logging {
            config.logging = logging;
        }

        Ok(config)
    }

    /// Applies environment variable overrides.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `TENANTGRAPH_IDLE_AFTER_SECS` | Idle threshold |
    /// | `TENANTGRAPH_EVICT_AFTER_SECS` | Eviction threshold |
    /// | `TENANTGRAPH_SWEEP_INTERVAL_MS` | Sweep interval |
    /// | `TENANTGRAPH_LEDGER_CAPACITY` | Committed-id ledger size |
    /// | `TENANTGRAPH_EVENT_CAPACITY` | Event bus buffer |
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(secs) = parse_env::<u64>("TENANTGRAPH_IDLE_AFTER_SECS") {
            self.registry.idle_after = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_env::<u64>("TENANTGRAPH_EVICT_AFTER_SECS") {
            self.registry.evict_after = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_env::<u64>("TENANTGRAPH_SWEEP_INTERVAL_MS") {
            self.registry.sweep_interval = Duration::from_millis(ms.max(1));
        }
        if let Some(capacity) = parse_env::<usize>("TENANTGRAPH_LEDGER_CAPACITY") {
            self.transactions.ledger_capacity = capacity.max(1);
        }
        if let Some(capacity) = parse_env::<usize>("TENANTGRAPH_EVENT_CAPACITY") {
            self.event_capacity = capacity.max(1);
        }
        self
    }

    /// Resolves the logging settings, honoring `TENANTGRAPH_LOG`.
    #[must_use]
    pub fn logging_config(&self) -> crate::observability::LoggingConfig {
        crate::observability::LoggingConfig::from_settings(Some(&self.logging))
    }

    /// Sets the registry configuration.
    #[must_use]
    pub const fn with_registry(mut self, registry: RegistryConfig) -> Self {
        self.registry = registry;
        self
    }

    /// Sets the storage configuration.
    #[must_use]
    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storage = storage;
        self
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
