//! Stand-in for the Datalogic decode shim.
//!
//! Exports the symbols `scanner-bridge` resolves for the barcode manager, the
//! read listener interface and decode results, following the conventions in
//! `datalogic-sys`. The `fixture_*` hooks let tests fire decode callbacks,
//! make `removeReadListener` fail and count live objects.
//!
//! Registered listeners live in process-global state, so tests loading this
//! library must run serially.
#![allow(unsafe_code)] // C ABI exports standing in for the vendor shim
#![allow(non_snake_case)] // symbol names follow the vendor's member names

use std::ffi::CString;
use std::os::raw::{c_char, c_int, c_void};
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use datalogic_sys::{dl_arg, dl_proxy_handler, DL_OK};
use parking_lot::Mutex;

const UNREGISTER_REFUSED: c_int = -1;

static LAST_ERROR: &[u8] = b"listener is busy\0";

static LIVE_MANAGERS: AtomicUsize = AtomicUsize::new(0);
static LIVE_PROXIES: AtomicUsize = AtomicUsize::new(0);
static FAIL_UNREGISTER: AtomicBool = AtomicBool::new(false);
static UNREGISTER_FAILED: AtomicBool = AtomicBool::new(false);
static REGISTERED: Mutex<Vec<Registration>> = parking_lot::const_mutex(Vec::new());

struct Manager;

struct Proxy {
    handler: *const dl_proxy_handler,
}

struct DecodeResult {
    text: CString,
}

/// A listener registered on a manager, as the scan engine keeps it.
#[derive(Clone, Copy)]
struct Registration {
    manager: *mut c_void,
    listener: *mut c_void,
}

// SAFETY: only dereferenced on the thread calling `fixture_emit`, while the
// objects are registered.
unsafe impl Send for Registration {}

// Barcode manager

/// `com.datalogic.decode.BarcodeManager` constructor.
#[no_mangle]
pub extern "C" fn com_datalogic_decode_BarcodeManager_new(_context: *mut c_void) -> *mut c_void {
    LIVE_MANAGERS.fetch_add(1, Ordering::SeqCst);
    Box::into_raw(Box::new(Manager)).cast()
}

/// Release a manager. Its listeners stay registered with the scan engine.
///
/// # Safety
///
/// `this` must come from `com_datalogic_decode_BarcodeManager_new`.
#[no_mangle]
pub unsafe extern "C" fn com_datalogic_decode_BarcodeManager_release(this: *mut c_void) {
    drop(unsafe { Box::from_raw(this.cast::<Manager>()) });
    LIVE_MANAGERS.fetch_sub(1, Ordering::SeqCst);
}

/// Register `listener` for decode callbacks.
#[no_mangle]
pub extern "C" fn com_datalogic_decode_BarcodeManager_addReadListener(
    this: *mut c_void,
    listener: *mut c_void,
) -> c_int {
    REGISTERED.lock().push(Registration {
        manager: this,
        listener,
    });
    DL_OK
}

/// Unregister `listener`, or refuse while [`fixture_fail_unregister`] is set.
#[no_mangle]
pub extern "C" fn com_datalogic_decode_BarcodeManager_removeReadListener(
    this: *mut c_void,
    listener: *mut c_void,
) -> c_int {
    if FAIL_UNREGISTER.load(Ordering::SeqCst) {
        UNREGISTER_FAILED.store(true, Ordering::SeqCst);
        return UNREGISTER_REFUSED;
    }
    UNREGISTER_FAILED.store(false, Ordering::SeqCst);
    REGISTERED
        .lock()
        .retain(|r| !(r.manager == this && r.listener == listener));
    DL_OK
}

// Read listener interface

/// Build a `com.datalogic.decode.ReadListener` forwarding to `handler`.
#[no_mangle]
pub extern "C" fn com_datalogic_decode_ReadListener_proxy(
    handler: *const dl_proxy_handler,
) -> *mut c_void {
    if handler.is_null() {
        return ptr::null_mut();
    }
    LIVE_PROXIES.fetch_add(1, Ordering::SeqCst);
    Box::into_raw(Box::new(Proxy { handler })).cast()
}

/// # Safety
///
/// `this` must come from `com_datalogic_decode_ReadListener_proxy`.
#[no_mangle]
pub unsafe extern "C" fn com_datalogic_decode_ReadListener_release(this: *mut c_void) {
    drop(unsafe { Box::from_raw(this.cast::<Proxy>()) });
    LIVE_PROXIES.fetch_sub(1, Ordering::SeqCst);
}

// Decode result

/// # Safety
///
/// `this` must be a `DecodeResult` handed out by `fixture_emit`.
#[no_mangle]
pub unsafe extern "C" fn com_datalogic_decode_DecodeResult_getText(
    this: *mut c_void,
) -> *const c_char {
    let result = unsafe { &*this.cast::<DecodeResult>() };
    result.text.as_ptr()
}

/// Message for the last refused call, null when there is none.
#[no_mangle]
pub extern "C" fn dl_last_error() -> *const c_char {
    if UNREGISTER_FAILED.load(Ordering::SeqCst) {
        LAST_ERROR.as_ptr().cast()
    } else {
        ptr::null()
    }
}

// Test hooks

/// Forget every registration and clear injected failures.
///
/// Objects still alive keep counting in the live totals.
#[no_mangle]
pub extern "C" fn fixture_reset() {
    REGISTERED.lock().clear();
    FAIL_UNREGISTER.store(false, Ordering::SeqCst);
    UNREGISTER_FAILED.store(false, Ordering::SeqCst);
}

/// Make every following `removeReadListener` fail.
#[no_mangle]
pub extern "C" fn fixture_fail_unregister(fail: bool) {
    FAIL_UNREGISTER.store(fail, Ordering::SeqCst);
}

/// Managers constructed and not yet released.
#[no_mangle]
pub extern "C" fn fixture_live_managers() -> usize {
    LIVE_MANAGERS.load(Ordering::SeqCst)
}

/// Listener proxies built and not yet released.
#[no_mangle]
pub extern "C" fn fixture_live_proxies() -> usize {
    LIVE_PROXIES.load(Ordering::SeqCst)
}

/// Listeners currently registered on any manager.
#[no_mangle]
pub extern "C" fn fixture_registered() -> usize {
    REGISTERED.lock().len()
}

/// Call `method` on every registered listener with one argument.
///
/// The argument is a `DecodeResult` carrying `text` and reported as
/// `type_name`; a null `text` passes a null object instead. Returns the
/// number of listeners called.
///
/// # Safety
///
/// `method` must be a NUL-terminated string. `type_name` and `text` must be
/// null or NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn fixture_emit(
    method: *const c_char,
    type_name: *const c_char,
    text: *const c_char,
) -> usize {
    let mut payload = (!text.is_null()).then(|| DecodeResult {
        text: unsafe { std::ffi::CStr::from_ptr(text) }.to_owned(),
    });
    let arg = dl_arg {
        type_name,
        object: payload
            .as_mut()
            .map_or(ptr::null_mut(), |p| ptr::from_mut(p).cast()),
    };

    // Listeners run without the registry lock, as the scan engine's
    // dispatcher would call them.
    let listeners: Vec<Registration> = REGISTERED.lock().clone();
    for registration in &listeners {
        // SAFETY: a registered listener is a live proxy built by
        // `com_datalogic_decode_ReadListener_proxy`.
        let proxy = unsafe { &*registration.listener.cast::<Proxy>() };
        let handler = unsafe { &*proxy.handler };
        unsafe { (handler.invoke)(handler.user_data, method, 1, &arg) };
    }
    listeners.len()
}
