//! Structured logging setup for hosts that have no tracing subscriber of
//! their own.
//!
//! Embedding applications that already install a `tracing` subscriber should
//! skip [`init_logging`]; every crate in the workspace only emits events and
//! never installs anything globally by itself.

use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::ManagerError;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format with colors.
    Pretty,
    /// Compact single-line format.
    Compact,
    /// Structured JSON for machine parsing.
    Json,
}

impl Default for LogFormat {
    fn default() -> Self {
        #[cfg(debug_assertions)]
        return Self::Pretty;

        #[cfg(not(debug_assertions))]
        return Self::Json;
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Base level for the workspace crates (e.g. "debug").
    pub level: String,
    /// Custom filter string overriding the default
    /// (e.g. "core_manager=trace,sqlx=warn").
    pub filter: Option<String>,
    pub display_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: "info".to_string(),
            filter: None,
            display_target: true,
        }
    }
}

impl LoggingConfig {
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, ManagerError> {
    let filter_string = if let Some(custom) = &config.filter {
        custom.clone()
    } else {
        let level = &config.level;
        format!(
            "core_task={level},core_adapter={level},adapter_sqlite={level},\
             core_manager={level},sqlx=warn"
        )
    };

    EnvFilter::try_new(filter_string)
        .map_err(|e| ManagerError::Config(format!("invalid log filter: {e}")))
}

/// Install the global tracing subscriber.
///
/// Call once during application startup; a second call fails because a
/// subscriber is already installed.
pub fn init_logging(config: LoggingConfig) -> Result<(), ManagerError> {
    let filter = build_filter(&config)?;
    let registry = tracing_subscriber::registry().with(filter);

    let init_result = match config.format {
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_target(config.display_target),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(config.display_target),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_target(config.display_target),
            )
            .try_init(),
    };

    init_result.map_err(|e| ManagerError::Config(format!("failed to initialize logging: {e}")))
}
