//! Vendor runtime backed by the Datalogic shim library.
//!
//! Loads the shared library with `libloading` and resolves every type and
//! member through the symbol conventions documented in `datalogic-sys`.
#![allow(unsafe_code)] // dlopen, dlsym and raw calls into the vendor shim

use std::any::Any;
use std::ffi::CStr;
use std::fmt;
use std::os::raw::{c_char, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};
use std::sync::Arc;

use datalogic_sys::{
    dl_arg, dl_last_error_fn, dl_method_fn, dl_new_fn, dl_proxy_fn, dl_proxy_handler,
    dl_release_fn, dl_text_fn, CONSTRUCTOR_SUFFIX, DL_OK, LAST_ERROR_SYMBOL, LIBRARY_PATH_ENV,
    PROXY_SUFFIX, RELEASE_SUFFIX,
};
use tracing::{debug, error, info, warn};

use super::{HostContext, InvocationHandler, NativeObject, ObjectRef, VendorRuntime};
use crate::config::SdkConfig;
use crate::error::{Result, RuntimeError};

/// Loaded shim library. Kept alive by every object created from it.
struct Library {
    library: libloading::Library,
    path: PathBuf,
}

impl Library {
    /// Resolve `<type_name>_<member>`.
    ///
    /// # Safety
    ///
    /// `T` must be the function pointer type documented for this member shape.
    unsafe fn resolve<T: Copy>(&self, type_name: &str, member: &str) -> Option<T> {
        let symbol = datalogic_sys::symbol_name(type_name, member);
        unsafe { self.library.get::<T>(&symbol) }.ok().map(|s| *s)
    }

    /// Message from `dl_last_error`, if the shim exports it.
    fn last_error(&self) -> Option<String> {
        let mut name = LAST_ERROR_SYMBOL.as_bytes().to_vec();
        name.push(0);
        // SAFETY: dl_last_error has the documented dl_last_error_fn signature.
        let last_error: libloading::Symbol<'_, dl_last_error_fn> =
            unsafe { self.library.get(&name) }.ok()?;
        let message = unsafe { last_error() };
        if message.is_null() {
            return None;
        }
        // SAFETY: non-null, NUL-terminated, copied before any further SDK call.
        Some(unsafe { CStr::from_ptr(message) }.to_string_lossy().into_owned())
    }
}

/// Runtime resolving vendor types from a dynamically loaded library.
#[derive(Clone)]
pub struct DynamicRuntime {
    lib: Arc<Library>,
    name: String,
}

impl fmt::Debug for DynamicRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicRuntime")
            .field("path", &self.lib.path)
            .finish()
    }
}

impl DynamicRuntime {
    /// Locate and load the shim library.
    ///
    /// Search order:
    /// 1. `sdk.library_path` from configuration
    /// 2. `DATALOGIC_SDK_PATH` environment variable
    /// 3. Configured search directories
    /// 4. `LD_LIBRARY_PATH` directories
    pub fn load(config: &SdkConfig) -> Result<Self> {
        if let Some(path) = &config.library_path {
            match Self::open(path) {
                Ok(runtime) => return Ok(runtime),
                Err(e) => warn!(path = %path.display(), error = %e, "Configured SDK library failed"),
            }
        }

        if let Some(path) = std::env::var_os(LIBRARY_PATH_ENV) {
            let path = PathBuf::from(path);
            match Self::open(&path) {
                Ok(runtime) => return Ok(runtime),
                Err(e) => warn!("{LIBRARY_PATH_ENV}={} set but failed: {e}", path.display()),
            }
        }

        let ld_dirs: Vec<PathBuf> = std::env::var("LD_LIBRARY_PATH")
            .map(|value| {
                value
                    .split(':')
                    .filter(|dir| !dir.is_empty())
                    .map(PathBuf::from)
                    .collect()
            })
            .unwrap_or_default();

        for dir in config.search_dirs.iter().chain(ld_dirs.iter()) {
            let Some(path) = find_library_in_dir(dir, &config.library_names) else {
                continue;
            };
            match Self::open(&path) {
                Ok(runtime) => return Ok(runtime),
                Err(e) => debug!(path = %path.display(), error = %e, "Found SDK library but failed"),
            }
        }

        Err(RuntimeError::LibraryNotFound {
            hint: format!(
                "Set {LIBRARY_PATH_ENV} or sdk.library_path to the location of {}",
                config.library_names.join(" / ")
            ),
        })
    }

    /// Load a specific library path.
    pub fn open(path: &Path) -> Result<Self> {
        // SAFETY: loading the vendor-provided shim; its initializers are the
        // vendor's responsibility, as with any system library.
        let library = unsafe { libloading::Library::new(path) }.map_err(|e| RuntimeError::Load {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        info!(path = %path.display(), "Loaded Datalogic SDK library");

        Ok(Self {
            lib: Arc::new(Library {
                library,
                path: path.to_path_buf(),
            }),
            name: path.display().to_string(),
        })
    }

    /// Path the library was loaded from.
    pub fn path(&self) -> &Path {
        &self.lib.path
    }

    fn own<'a>(&self, object: &'a ObjectRef) -> Result<&'a DynamicObject> {
        object
            .as_any()
            .downcast_ref::<DynamicObject>()
            .filter(|o| Arc::ptr_eq(&o.lib, &self.lib))
            .ok_or_else(|| RuntimeError::ObjectMismatch {
                type_name: object.type_name().to_string(),
            })
    }

    fn failure_message(&self, fallback: impl FnOnce() -> String) -> String {
        self.lib.last_error().unwrap_or_else(fallback)
    }
}

impl VendorRuntime for DynamicRuntime {
    fn name(&self) -> &str {
        &self.name
    }

    fn resolve_type(&self, type_name: &str) -> Result<()> {
        // Classes export a constructor, interfaces a proxy factory.
        let found = unsafe {
            self.lib
                .resolve::<unsafe extern "C" fn()>(type_name, CONSTRUCTOR_SUFFIX)
                .is_some()
                || self
                    .lib
                    .resolve::<unsafe extern "C" fn()>(type_name, PROXY_SUFFIX)
                    .is_some()
        };
        if found {
            Ok(())
        } else {
            Err(RuntimeError::TypeNotFound {
                type_name: type_name.to_string(),
            })
        }
    }

    fn construct(&self, type_name: &str, context: &HostContext) -> Result<ObjectRef> {
        let constructor: dl_new_fn = unsafe { self.lib.resolve(type_name, CONSTRUCTOR_SUFFIX) }
            .ok_or_else(|| RuntimeError::MemberNotFound {
                type_name: type_name.to_string(),
                member: CONSTRUCTOR_SUFFIX.to_string(),
            })?;

        // SAFETY: the constructor takes the opaque context and returns an owned object or null.
        let raw = unsafe { constructor(context.as_ptr()) };
        let ptr = NonNull::new(raw).ok_or_else(|| RuntimeError::Construction {
            type_name: type_name.to_string(),
            message: self.failure_message(|| "constructor returned null".to_string()),
        })?;

        Ok(Arc::new(DynamicObject {
            ptr,
            type_name: type_name.to_string(),
            lib: Arc::clone(&self.lib),
            ownership: Ownership::Owned,
        }))
    }

    fn proxy(&self, interface: &str, handler: Arc<dyn InvocationHandler>) -> Result<ObjectRef> {
        let factory: dl_proxy_fn = unsafe { self.lib.resolve(interface, PROXY_SUFFIX) }
            .ok_or_else(|| RuntimeError::TypeNotFound {
                type_name: interface.to_string(),
            })?;

        let state = ProxyState::new(ProxyContext {
            handler,
            lib: Arc::clone(&self.lib),
        });

        // SAFETY: the handler table lives in `state`, which outlives the proxy
        // because it is released only after the proxy (see DynamicObject::drop).
        let raw = unsafe { factory(&*state.table) };
        let ptr = NonNull::new(raw).ok_or_else(|| RuntimeError::Construction {
            type_name: interface.to_string(),
            message: self.failure_message(|| "proxy factory returned null".to_string()),
        })?;

        Ok(Arc::new(DynamicObject {
            ptr,
            type_name: interface.to_string(),
            lib: Arc::clone(&self.lib),
            ownership: Ownership::Proxy(state),
        }))
    }

    fn invoke(&self, target: &ObjectRef, method: &str, arg: &ObjectRef) -> Result<()> {
        let target = self.own(target)?;
        let arg = self.own(arg)?;

        let method_fn: dl_method_fn = unsafe { self.lib.resolve(&target.type_name, method) }
            .ok_or_else(|| RuntimeError::MemberNotFound {
                type_name: target.type_name.clone(),
                member: method.to_string(),
            })?;

        // SAFETY: both pointers are live objects of this library.
        let status = unsafe { method_fn(target.ptr.as_ptr(), arg.ptr.as_ptr()) };
        if status != DL_OK {
            return Err(RuntimeError::Invocation {
                type_name: target.type_name.clone(),
                method: method.to_string(),
                message: self.failure_message(|| format!("status {status}")),
            });
        }
        Ok(())
    }
}

enum Ownership {
    /// Created by the bridge, released on drop.
    Owned,
    /// Handed to a callback by the SDK; never released by us.
    Borrowed,
    /// Proxy created by the bridge; its handler table is freed after release.
    Proxy(ProxyState),
}

/// Object pointer from the shim library.
struct DynamicObject {
    ptr: NonNull<c_void>,
    type_name: String,
    lib: Arc<Library>,
    ownership: Ownership,
}

// SAFETY: the shim's objects are documented thread-safe; the bridge serializes
// all control-path calls behind its own lock.
unsafe impl Send for DynamicObject {}
unsafe impl Sync for DynamicObject {}

impl fmt::Debug for DynamicObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicObject")
            .field("type_name", &self.type_name)
            .field("ptr", &self.ptr)
            .finish()
    }
}

impl NativeObject for DynamicObject {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn call_text(&self, accessor: &str) -> Result<Option<String>> {
        let accessor_fn: dl_text_fn = unsafe { self.lib.resolve(&self.type_name, accessor) }
            .ok_or_else(|| RuntimeError::MemberNotFound {
                type_name: self.type_name.clone(),
                member: accessor.to_string(),
            })?;

        // SAFETY: ptr is live for at least the duration of this call.
        let text = unsafe { accessor_fn(self.ptr.as_ptr()) };
        if text.is_null() {
            return Ok(None);
        }
        Ok(Some(
            unsafe { CStr::from_ptr(text) }.to_string_lossy().into_owned(),
        ))
    }
}

impl Drop for DynamicObject {
    fn drop(&mut self) {
        if matches!(self.ownership, Ownership::Borrowed) {
            return;
        }
        let release: Option<dl_release_fn> =
            unsafe { self.lib.resolve(&self.type_name, RELEASE_SUFFIX) };
        if let Some(release) = release {
            debug!(type_name = %self.type_name, "Releasing SDK object");
            // SAFETY: we own this object and nothing else references it.
            unsafe { release(self.ptr.as_ptr()) };
        }
        // A proxy's handler table is dropped with `ownership`, after release.
    }
}

/// Argument the SDK passed as null.
#[derive(Debug)]
struct NullObject {
    type_name: String,
}

impl NativeObject for NullObject {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn call_text(&self, _accessor: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

/// State reachable from a proxy's `user_data`.
struct ProxyContext {
    handler: Arc<dyn InvocationHandler>,
    lib: Arc<Library>,
}

/// Heap allocations whose addresses were given to the SDK.
struct ProxyState {
    table: Box<dl_proxy_handler>,
    context: *mut ProxyContext,
}

impl ProxyState {
    fn new(context: ProxyContext) -> Self {
        let context = Box::into_raw(Box::new(context));
        Self {
            table: Box::new(dl_proxy_handler {
                user_data: context.cast::<c_void>(),
                invoke: invoke_trampoline,
            }),
            context,
        }
    }
}

impl Drop for ProxyState {
    fn drop(&mut self) {
        // SAFETY: produced by Box::into_raw in ProxyState::new and freed only here.
        drop(unsafe { Box::from_raw(self.context) });
    }
}

/// Entry point the SDK calls for every method of a proxy.
///
/// Unwinding into the SDK's thread is undefined behavior and would take the
/// scan engine down with it, so every panic is caught here and the call
/// returns null regardless.
unsafe extern "C" fn invoke_trampoline(
    user_data: *mut c_void,
    method: *const c_char,
    argc: usize,
    argv: *const dl_arg,
) -> *mut c_void {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        if user_data.is_null() || method.is_null() {
            return;
        }
        // SAFETY: user_data is the ProxyContext installed by ProxyState::new.
        let context = unsafe { &*user_data.cast::<ProxyContext>() };
        let method = unsafe { CStr::from_ptr(method) }.to_string_lossy();

        let raw_args: &[dl_arg] = if argv.is_null() || argc == 0 {
            &[]
        } else {
            // SAFETY: the SDK passes argc valid entries for the callback's duration.
            unsafe { std::slice::from_raw_parts(argv, argc) }
        };
        let args: Vec<ObjectRef> = raw_args
            .iter()
            .map(|arg| borrowed_arg(&context.lib, arg))
            .collect();

        context.handler.invoke(&method, &args);
    }));

    if outcome.is_err() {
        error!("Proxy handler panicked; call dropped");
    }
    ptr::null_mut()
}

fn borrowed_arg(lib: &Arc<Library>, arg: &dl_arg) -> ObjectRef {
    let type_name = if arg.type_name.is_null() {
        String::new()
    } else {
        // SAFETY: non-null, NUL-terminated for the callback's duration.
        unsafe { CStr::from_ptr(arg.type_name) }
            .to_string_lossy()
            .into_owned()
    };

    match NonNull::new(arg.object) {
        Some(ptr) => Arc::new(DynamicObject {
            ptr,
            type_name,
            lib: Arc::clone(lib),
            ownership: Ownership::Borrowed,
        }),
        None => Arc::new(NullObject { type_name }),
    }
}

/// Scan a directory for one of `names`, preferring exact names, then the
/// highest versioned soname (`libdatalogic_decode.so.10` over `.so.9`).
fn find_library_in_dir(dir: &Path, names: &[String]) -> Option<PathBuf> {
    if let Some(exact) = names.iter().map(|n| dir.join(n)).find(|p| p.is_file()) {
        return Some(exact);
    }

    std::fs::read_dir(dir)
        .ok()?
        .filter_map(std::result::Result::ok)
        .filter_map(|entry| {
            let file_name = entry.file_name();
            let file_name = file_name.to_str()?;
            let version = names
                .iter()
                .find_map(|name| soname_version(file_name, name))?;
            Some((version, entry.path()))
        })
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, path)| path)
}

/// Numeric suffix of a versioned soname, `libx.so.1.10` -> `[1, 10]`.
///
/// `None` unless every component after `name.` is a number.
fn soname_version(file_name: &str, name: &str) -> Option<Vec<u32>> {
    file_name
        .strip_prefix(name)?
        .strip_prefix('.')?
        .split('.')
        .map(|part| part.parse().ok())
        .collect()
}
