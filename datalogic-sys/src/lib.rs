//! Low-level ABI declarations for the Datalogic decode shim.
//!
//! The vendor SDK ships as an optional shared library that exposes its object
//! model through plain C symbols. Nothing in this crate is linked: every
//! symbol is looked up by name at runtime, so a build without the SDK installed
//! still compiles and runs. For a safe wrapper, use the `scanner-bridge` crate.
//!
//! # Symbol conventions
//!
//! Dotted type names are flattened with `_` and suffixed with the member name
//! (see [`symbol_name`]):
//!
//! | Shape | Symbol | Signature |
//! |---|---|---|
//! | constructor | `<Type>_new` | [`dl_new_fn`] |
//! | interface proxy | `<Interface>_proxy` | [`dl_proxy_fn`] |
//! | single-argument method | `<Type>_<method>` | [`dl_method_fn`] |
//! | text accessor | `<Type>_<accessor>` | [`dl_text_fn`] |
//! | destructor (optional) | `<Type>_release` | [`dl_release_fn`] |
//! | last error (optional) | `dl_last_error` | [`dl_last_error_fn`] |
//!
//! # Safety
//!
//! All function pointers described here are `unsafe` to call. Text returned
//! by accessors and `dl_last_error` is owned by the SDK and only valid until
//! the next call on the same thread; copy it immediately.

#![allow(non_camel_case_types)]

use std::os::raw::{c_char, c_int, c_void};

/// Default library file names probed in each search directory.
pub const DEFAULT_LIBRARY_NAMES: &[&str] = &["libdatalogic_decode.so", "libdatalogic.so"];

/// Environment variable holding an explicit path to the shim library.
pub const LIBRARY_PATH_ENV: &str = "DATALOGIC_SDK_PATH";

/// Symbol suffix of constructors.
pub const CONSTRUCTOR_SUFFIX: &str = "new";

/// Symbol suffix of interface proxy factories.
pub const PROXY_SUFFIX: &str = "proxy";

/// Symbol suffix of destructors.
pub const RELEASE_SUFFIX: &str = "release";

/// Name of the optional last-error symbol.
pub const LAST_ERROR_SYMBOL: &str = "dl_last_error";

/// Status code returned by methods on success.
pub const DL_OK: c_int = 0;

/// One argument passed by the SDK into a proxy callback.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct dl_arg {
    /// Dotted runtime type name of `object`, NUL-terminated. May be null.
    pub type_name: *const c_char,
    /// Borrowed object pointer, valid for the duration of the callback.
    pub object: *mut c_void,
}

/// Generic invocation entry point of a proxy.
///
/// Called by the SDK on its own thread for every method of the proxied
/// interface. The return value is handed back to the SDK as the method result.
pub type dl_invoke_fn = unsafe extern "C" fn(
    user_data: *mut c_void,
    method: *const c_char,
    argc: usize,
    argv: *const dl_arg,
) -> *mut c_void;

/// Handler table passed to `<Interface>_proxy`.
///
/// The SDK keeps the pointer until the proxy is released, so the table must
/// outlive the proxy object. `<Interface>_release` does not return while a
/// call on that proxy is in progress, and no call starts after it returns.
/// A proxy the SDK still has registered must therefore never be released.
#[repr(C)]
#[derive(Debug)]
pub struct dl_proxy_handler {
    /// Opaque pointer handed back to `invoke`.
    pub user_data: *mut c_void,
    /// Invocation entry point.
    pub invoke: dl_invoke_fn,
}

/// `<Type>_new(context)`
pub type dl_new_fn = unsafe extern "C" fn(context: *mut c_void) -> *mut c_void;

/// `<Interface>_proxy(handler)`
pub type dl_proxy_fn = unsafe extern "C" fn(handler: *const dl_proxy_handler) -> *mut c_void;

/// `<Type>_<method>(self, arg)`, returns [`DL_OK`] on success.
pub type dl_method_fn = unsafe extern "C" fn(this: *mut c_void, arg: *mut c_void) -> c_int;

/// `<Type>_<accessor>(self)`, null when the object has no value.
pub type dl_text_fn = unsafe extern "C" fn(this: *mut c_void) -> *const c_char;

/// `<Type>_release(self)`
pub type dl_release_fn = unsafe extern "C" fn(this: *mut c_void);

/// `dl_last_error()`
pub type dl_last_error_fn = unsafe extern "C" fn() -> *const c_char;

/// Map a dotted type name and a member to its exported symbol name.
///
/// The result is NUL-terminated so it can be handed straight to `dlsym`.
///
/// ```
/// assert_eq!(
///     datalogic_sys::symbol_name("com.datalogic.decode.BarcodeManager", "new"),
///     b"com_datalogic_decode_BarcodeManager_new\0".to_vec(),
/// );
/// ```
pub fn symbol_name(type_name: &str, member: &str) -> Vec<u8> {
    let mut symbol = Vec::with_capacity(type_name.len() + member.len() + 2);
    symbol.extend(
        type_name
            .bytes()
            .map(|b| if b == b'.' || b == b'$' { b'_' } else { b }),
    );
    symbol.push(b'_');
    symbol.extend_from_slice(member.as_bytes());
    symbol.push(0);
    symbol
}
