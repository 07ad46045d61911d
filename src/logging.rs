//! Tracing setup for hosts and the CLI.
//!
//! The library itself only emits `tracing` events; installing a subscriber is
//! left to whoever owns the process. This module provides the subscriber the
//! `scanner-bridge` binary uses:
//! - Multiple output formats (pretty, compact, JSON)
//! - Environment-based filtering (`RUST_LOG` wins over the configured level)
//!
//! # Example
//! ```no_run
//! use scanner_bridge::{config::BridgeConfig, logging};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BridgeConfig::load()?;
//! logging::init_from_config(&config)?;
//! tracing::info!("Bridge host started");
//! # Ok(())
//! # }
//! ```

use crate::config::BridgeConfig;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Output format for tracing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Pretty-printed format with colors (for development)
    Pretty,
    /// Compact format without colors (for device logs)
    Compact,
    /// JSON format for structured logging (for log aggregation)
    Json,
}

/// Tracing configuration options
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: Level,
    /// Output format
    pub format: OutputFormat,
    /// Whether to include span events (NEW, CLOSE)
    pub with_span_events: bool,
    /// Whether to include thread names; decode callbacks arrive on SDK threads
    pub with_thread_names: bool,
    /// Whether to enable ANSI colors (only for Pretty format)
    pub with_ansi: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: OutputFormat::Pretty,
            with_span_events: false,
            with_thread_names: true,
            with_ansi: true,
        }
    }
}

impl TracingConfig {
    /// Create tracing config from the bridge configuration
    pub fn from_bridge_config(config: &BridgeConfig) -> Result<Self, String> {
        Ok(Self {
            level: parse_log_level(&config.logging.level)?,
            format: parse_format(&config.logging.format)?,
            ..Default::default()
        })
    }

    /// Create tracing config with custom settings
    pub fn new(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Set output format
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Enable or disable span events
    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.with_span_events = enabled;
        self
    }

    /// Enable or disable ANSI colors
    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.with_ansi = enabled;
        self
    }
}

/// Initialize tracing from the bridge configuration
pub fn init_from_config(config: &BridgeConfig) -> Result<(), String> {
    init(TracingConfig::from_bridge_config(config)?)
}

/// Initialize tracing with custom configuration
///
/// Idempotent: if a global subscriber is already installed this returns
/// `Ok(())`, which keeps it safe to call from tests and embedding hosts.
pub fn init(config: TracingConfig) -> Result<(), String> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str().to_lowercase()));

    let span_events = if config.with_span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let layer = match config.format {
        OutputFormat::Pretty => fmt::layer()
            .pretty()
            .with_span_events(span_events)
            .with_thread_names(config.with_thread_names)
            .with_ansi(config.with_ansi)
            .with_filter(env_filter)
            .boxed(),
        OutputFormat::Compact => fmt::layer()
            .compact()
            .with_span_events(span_events)
            .with_thread_names(config.with_thread_names)
            .with_ansi(false)
            .with_filter(env_filter)
            .boxed(),
        OutputFormat::Json => fmt::layer()
            .json()
            .with_span_events(span_events)
            .with_thread_names(config.with_thread_names)
            .with_filter(env_filter)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .or_else(|e| {
            // Another component already installed a subscriber
            if e.to_string()
                .contains("a global default trace dispatcher has already been set")
            {
                Ok(())
            } else {
                Err(format!("Failed to initialize tracing: {}", e))
            }
        })
}

/// Parse log level string into tracing Level
fn parse_log_level(level: &str) -> Result<Level, String> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(format!(
            "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
            level
        )),
    }
}

fn parse_format(format: &str) -> Result<OutputFormat, String> {
    match format.to_lowercase().as_str() {
        "pretty" => Ok(OutputFormat::Pretty),
        "compact" => Ok(OutputFormat::Compact),
        "json" => Ok(OutputFormat::Json),
        _ => Err(format!(
            "Invalid log format '{}'. Must be one of: pretty, compact, json",
            format
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert!(matches!(parse_log_level("trace"), Ok(Level::TRACE)));
        assert!(matches!(parse_log_level("warn"), Ok(Level::WARN)));

        // Case insensitive
        assert!(matches!(parse_log_level("INFO"), Ok(Level::INFO)));
        assert!(matches!(parse_log_level("Debug"), Ok(Level::DEBUG)));

        assert!(parse_log_level("invalid").is_err());
    }

    #[test]
    fn test_tracing_config_from_bridge_config() {
        let mut config = BridgeConfig::default();
        config.logging.level = "debug".to_string();
        config.logging.format = "json".to_string();

        let tracing_config = TracingConfig::from_bridge_config(&config).unwrap();
        assert_eq!(tracing_config.level, Level::DEBUG);
        assert_eq!(tracing_config.format, OutputFormat::Json);
    }

    #[test]
    fn test_tracing_config_builder() {
        let config = TracingConfig::new(Level::WARN)
            .with_format(OutputFormat::Compact)
            .with_span_events(true)
            .with_ansi(false);

        assert_eq!(config.level, Level::WARN);
        assert_eq!(config.format, OutputFormat::Compact);
        assert!(config.with_span_events);
        assert!(!config.with_ansi);
    }
}
