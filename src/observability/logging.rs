//! Structured logging configuration.

use crate::config::LoggingSettings;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "tenantgraph=info";
const LOG_ENV: &str = "TENANTGRAPH_LOG";

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Parses a format name, case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Resolved logging configuration.
#[derive(Debug)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// Event filter.
    pub filter: EnvFilter,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::from_settings(None)
    }
}

impl LoggingConfig {
    /// Builds the configuration from file settings.
    ///
    /// `TENANTGRAPH_LOG` takes precedence over the configured filter. An
    /// invalid directive falls back to `tenantgraph=info`.
    #[must_use]
    pub fn from_settings(settings: Option<&LoggingSettings>) -> Self {
        let format = settings
            .and_then(|s| s.format.as_deref())
            .and_then(LogFormat::parse)
            .unwrap_or_default();
        let directive = std::env::var(LOG_ENV)
            .ok()
            .or_else(|| settings.and_then(|s| s.filter.clone()))
            .unwrap_or_else(|| DEFAULT_FILTER.to_string());
        let filter =
            EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        Self { format, filter }
    }
}
