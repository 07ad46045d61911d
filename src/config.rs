//! Bridge configuration using Figment
//!
//! Configuration is loaded from:
//! 1. Built-in defaults (the names exported by the Datalogic SDK)
//! 2. `config/scanner_bridge.toml` (optional)
//! 3. Environment variables prefixed with `SCANNER_BRIDGE_`, nested keys
//!    separated by `__`
//!
//! # Example
//! ```no_run
//! use scanner_bridge::config::BridgeConfig;
//!
//! let config = BridgeConfig::load()?;
//! println!("Manager type: {}", config.sdk.names.manager_type);
//! # Ok::<(), scanner_bridge::error::ConfigError>(())
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/scanner_bridge.toml";

/// Top-level bridge configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Vendor SDK discovery and naming
    #[serde(default)]
    pub sdk: SdkConfig,
    /// Host channel names
    #[serde(default)]
    pub channels: ChannelConfig,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where to find the vendor library and what its members are called.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SdkConfig {
    /// Explicit library path, tried before anything else
    #[serde(default)]
    pub library_path: Option<PathBuf>,
    /// Directories scanned for `library_names`
    #[serde(default = "default_search_dirs")]
    pub search_dirs: Vec<PathBuf>,
    /// Library file names accepted in each search directory
    #[serde(default = "default_library_names")]
    pub library_names: Vec<String>,
    /// Names resolved inside the library
    #[serde(default)]
    pub names: SdkNames,
}

/// Names of the vendor types and members resolved at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdkNames {
    /// Entry type, probed for capability detection and constructed on init
    pub manager_type: String,
    /// Listener interface implemented by the decode proxy
    pub listener_type: String,
    /// Listener method carrying a decode event
    pub decode_method: String,
    /// Accessor on the decode payload returning the barcode text
    pub text_accessor: String,
    /// Manager method registering a listener
    pub register_method: String,
    /// Manager method unregistering a listener
    pub unregister_method: String,
}

impl Default for SdkNames {
    fn default() -> Self {
        Self {
            manager_type: "com.datalogic.decode.BarcodeManager".to_string(),
            listener_type: "com.datalogic.decode.ReadListener".to_string(),
            decode_method: "onRead".to_string(),
            text_accessor: "getText".to_string(),
            register_method: "addReadListener".to_string(),
            unregister_method: "removeReadListener".to_string(),
        }
    }
}

/// Channel names under which the plugin registers with the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Request/response channel
    pub method: String,
    /// Decode event channel
    pub events: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            method: "com.quilmedic/datalogic_scanner".to_string(),
            events: "com.quilmedic/datalogic_scanner_events".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (pretty, compact, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            library_path: None,
            search_dirs: default_search_dirs(),
            library_names: default_library_names(),
            names: SdkNames::default(),
        }
    }
}

// Default value functions
fn default_search_dirs() -> Vec<PathBuf> {
    [
        // Android vendor partition
        "/vendor/lib64",
        "/vendor/lib",
        "/system/lib64",
        // Desktop test rigs
        "/usr/local/lib",
        "/usr/lib",
    ]
    .iter()
    .map(PathBuf::from)
    .collect()
}

fn default_library_names() -> Vec<String> {
    datalogic_sys::DEFAULT_LIBRARY_NAMES
        .iter()
        .map(|name| name.to_string())
        .collect()
}

impl BridgeConfig {
    /// Load configuration from the default file and environment variables
    ///
    /// Environment variables override the file with prefix `SCANNER_BRIDGE_`.
    /// Example: `SCANNER_BRIDGE_SDK__LIBRARY_PATH=/opt/datalogic/libdatalogic_decode.so`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = Self::figment(path.as_ref()).extract()?;
        config.validate()?;
        Ok(config)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("SCANNER_BRIDGE_").split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_formats.join(", ")
            )));
        }

        let names = &self.sdk.names;
        for (key, value) in [
            ("manager_type", &names.manager_type),
            ("listener_type", &names.listener_type),
            ("decode_method", &names.decode_method),
            ("text_accessor", &names.text_accessor),
            ("register_method", &names.register_method),
            ("unregister_method", &names.unregister_method),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("sdk.names.{key} is empty")));
            }
        }

        if self.channels.method == self.channels.events {
            return Err(ConfigError::Invalid(format!(
                "Method and event channels must differ (both '{}')",
                self.channels.method
            )));
        }

        Ok(())
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}
