//! Error types for scanner bridge operations.
//!
//! Absence of the vendor SDK is not an error: it is reported through
//! [`ScannerBridge::is_available`](crate::ScannerBridge::is_available). The
//! types here cover everything that can go wrong once the SDK is believed to
//! be present, plus configuration loading.

use thiserror::Error;

/// Result type alias for vendor runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Failures raised while resolving or calling into the vendor SDK.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// No candidate shared library was found in any search location.
    #[error("Datalogic SDK library not found. {hint}")]
    LibraryNotFound { hint: String },

    /// A candidate library exists but the loader rejected it.
    #[error("Failed to load '{path}': {message}")]
    Load { path: String, message: String },

    /// The named type is not exported by the SDK.
    #[error("Type not found: {type_name}")]
    TypeNotFound { type_name: String },

    /// The type exists but the named member does not.
    #[error("No member '{member}' on {type_name}")]
    MemberNotFound { type_name: String, member: String },

    /// The constructor or proxy factory returned no object.
    #[error("Failed to construct {type_name}: {message}")]
    Construction { type_name: String, message: String },

    /// The vendor call itself reported a failure.
    #[error("{type_name}.{method} failed: {message}")]
    Invocation {
        type_name: String,
        method: String,
        message: String,
    },

    /// An object produced by one runtime was handed to another.
    #[error("Object of type {type_name} does not belong to this runtime")]
    ObjectMismatch { type_name: String },

    /// The runtime has no SDK behind it.
    #[error("Datalogic SDK is not available")]
    Unavailable,
}

impl RuntimeError {
    /// Check if this error means the SDK (or one of its types) is missing.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::LibraryNotFound { .. } | Self::TypeNotFound { .. } | Self::Unavailable
        )
    }
}

/// Failures of [`ScannerBridge::init_scanner`](crate::ScannerBridge::init_scanner).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InitError {
    /// The capability flag is false.
    #[error("Datalogic SDK is not available")]
    NotAvailable,

    /// A manager and listener are already registered.
    #[error("Scanner is already initialized; dispose it first")]
    AlreadyInitialized,

    /// A dynamic resolution, construction or invocation step failed.
    #[error("Failed to initialize scanner: {0}")]
    Failure(#[source] RuntimeError),
}

impl InitError {
    /// Tagged failure code reported to the host application.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotAvailable => "NOT_AVAILABLE",
            Self::AlreadyInitialized => "ALREADY_INITIALIZED",
            Self::Failure(_) => "INIT_ERROR",
        }
    }
}

/// Failures of [`ScannerBridge::dispose_scanner`](crate::ScannerBridge::dispose_scanner).
///
/// The handles are already cleared when this is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DisposeError {
    /// Unregistering the listener failed.
    #[error("Failed to dispose scanner: {0}")]
    Failure(#[source] RuntimeError),
}

impl DisposeError {
    /// Tagged failure code reported to the host application.
    pub fn error_code(&self) -> &'static str {
        "DISPOSE_ERROR"
    }
}

/// Configuration loading and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Figment could not extract the configuration.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// The configuration loaded but is not usable.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Load(Box::new(err))
    }
}
