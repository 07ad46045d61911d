//! Runtime view of the optional vendor SDK.
//!
//! The bridge never names a vendor type at compile time. Everything it needs
//! is looked up by name through a [`VendorRuntime`]:
//!
//! - [`DynamicRuntime`] resolves exported symbols from the shared library
//!   found at runtime.
//! - [`AbsentRuntime`] is the null object used when no library was found.
//! - `MockSdk` (feature `mock`) simulates the SDK in-process.
//!
//! [`discover`] picks between the first two.
#![allow(unsafe_code)] // HostContext carries the host's raw context pointer across threads

use std::any::Any;
use std::fmt;
use std::os::raw::c_void;
use std::sync::Arc;

use tracing::debug;

use crate::config::SdkConfig;
use crate::error::Result;

mod absent;
mod dynamic;

pub use absent::AbsentRuntime;
pub use dynamic::DynamicRuntime;

/// Shared reference to an object living inside the vendor SDK.
///
/// Dropping the last reference to an object the bridge created releases it in
/// the SDK.
pub type ObjectRef = Arc<dyn NativeObject>;

/// An object owned (or borrowed) from the vendor SDK.
pub trait NativeObject: Send + Sync + fmt::Debug {
    /// Dotted runtime type name, e.g. `com.datalogic.decode.BarcodeManager`.
    fn type_name(&self) -> &str;

    /// Concrete object, so a runtime can recognise its own objects.
    fn as_any(&self) -> &dyn Any;

    /// Invoke a zero-argument accessor returning text.
    ///
    /// `Ok(None)` means the accessor exists but produced no value.
    fn call_text(&self, accessor: &str) -> Result<Option<String>>;
}

/// Receives every call made on a proxy built by [`VendorRuntime::proxy`].
///
/// Runs on a thread owned by the SDK. Implementations must not panic; the
/// value handed back to the SDK is always a neutral null.
pub trait InvocationHandler: Send + Sync {
    /// Handle one call of `method` with the SDK-provided arguments.
    fn invoke(&self, method: &str, args: &[ObjectRef]);
}

/// Name-based access to the vendor SDK's types and members.
pub trait VendorRuntime: Send + Sync {
    /// Human-readable description (library path, "mock", "absent").
    fn name(&self) -> &str;

    /// Resolve a type by its dotted name without creating anything.
    fn resolve_type(&self, type_name: &str) -> Result<()>;

    /// Construct `type_name` passing the host context as sole argument.
    fn construct(&self, type_name: &str, context: &HostContext) -> Result<ObjectRef>;

    /// Build an object implementing `interface` that forwards every call to `handler`.
    fn proxy(&self, interface: &str, handler: Arc<dyn InvocationHandler>) -> Result<ObjectRef>;

    /// Invoke a single-argument `method` on `target`.
    fn invoke(&self, target: &ObjectRef, method: &str, arg: &ObjectRef) -> Result<()>;
}

/// Opaque host application context handed to vendor constructors.
///
/// On Android this is the application `Context` reference; elsewhere it may
/// be null. The bridge never dereferences it.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct HostContext {
    raw: *mut c_void,
}

// SAFETY: the pointer is only passed through to the vendor constructor, which
// documents the application context as usable from any thread.
unsafe impl Send for HostContext {}
unsafe impl Sync for HostContext {}

impl HostContext {
    /// Wrap a raw context pointer provided by the host.
    pub fn from_raw(raw: *mut c_void) -> Self {
        Self { raw }
    }

    /// A null context, for hosts without an application object.
    pub fn null() -> Self {
        Self {
            raw: std::ptr::null_mut(),
        }
    }

    /// Raw pointer passed to vendor constructors.
    pub fn as_ptr(&self) -> *mut c_void {
        self.raw
    }

    /// Whether the host provided no context.
    pub fn is_null(&self) -> bool {
        self.raw.is_null()
    }
}

impl Default for HostContext {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Debug for HostContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostContext({:p})", self.raw)
    }
}

/// Load the vendor library if one is installed, otherwise fall back to the
/// null-object runtime.
///
/// Never fails: absence of the SDK is an expected outcome.
pub fn discover(config: &SdkConfig) -> Arc<dyn VendorRuntime> {
    match DynamicRuntime::load(config) {
        Ok(runtime) => Arc::new(runtime),
        Err(e) => {
            debug!(error = %e, "Datalogic SDK library unavailable, using absent runtime");
            Arc::new(AbsentRuntime::new())
        }
    }
}
