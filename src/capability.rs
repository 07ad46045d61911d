//! Runtime detection of the optional vendor SDK.

use std::fmt;

use tracing::debug;

use crate::runtime::VendorRuntime;

/// Outcome of probing for the SDK's entry type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// The entry type resolved.
    Present,
    /// The SDK (or the type) is not installed.
    Absent,
    /// Resolution failed for another reason; treated as absent.
    Failed(String),
}

impl Probe {
    /// Probe `runtime` for `entry_type`. Never fails.
    pub fn run(runtime: &dyn VendorRuntime, entry_type: &str) -> Self {
        match runtime.resolve_type(entry_type) {
            Ok(()) => Self::Present,
            Err(e) if e.is_not_found() => Self::Absent,
            Err(e) => Self::Failed(e.to_string()),
        }
    }

    /// Collapse to the capability flag.
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present)
    }
}

impl fmt::Display for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present => write!(f, "present"),
            Self::Absent => write!(f, "absent"),
            Self::Failed(reason) => write!(f, "failed ({reason})"),
        }
    }
}

/// Resolve the SDK's entry type once and report whether it is usable.
///
/// Type presence does not change within a process, so callers cache the
/// result instead of calling this per operation.
pub fn detect(runtime: &dyn VendorRuntime, entry_type: &str) -> bool {
    let probe = Probe::run(runtime, entry_type);
    if probe.is_present() {
        debug!(runtime = runtime.name(), entry_type, "Datalogic SDK is available");
    } else {
        debug!(runtime = runtime.name(), entry_type, %probe, "Datalogic SDK is not available");
    }
    probe.is_present()
}
