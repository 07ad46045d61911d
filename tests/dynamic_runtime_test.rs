//! `DynamicRuntime` against a real shared library.
//!
//! Loads the `datalogic-fixture` cdylib, which cargo builds next to this test
//! binary, and drives decode callbacks through its `fixture_*` hooks. The
//! fixture's registry is process-global, so every test here is serial.
#![allow(unsafe_code)] // calls the fixture's C hooks

use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::ffi::CString;
use std::os::raw::c_char;
use std::path::PathBuf;
use std::ptr;
use std::sync::Arc;

use parking_lot::Mutex;
use scanner_bridge::runtime::DynamicRuntime;
use scanner_bridge::{
    DisposeError, HostContext, RuntimeError, ScanSink, ScannerBridge, SdkNames, VendorRuntime,
};
use serial_test::serial;

const DECODE_RESULT: &str = "com.datalogic.decode.DecodeResult";

/// Locate the fixture library among the test binary's sibling artifacts.
fn fixture_path() -> PathBuf {
    let exe = std::env::current_exe().unwrap();
    let deps = exe.parent().unwrap();
    let prefix = format!("{DLL_PREFIX}datalogic_fixture");

    let mut candidates: Vec<PathBuf> = std::fs::read_dir(deps)
        .unwrap()
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(&prefix) && name.ends_with(DLL_SUFFIX))
        })
        .collect();
    candidates.sort_by_key(|path| std::fs::metadata(path).and_then(|m| m.modified()).ok());
    candidates
        .pop()
        .unwrap_or_else(|| panic!("datalogic-fixture library not found in {}", deps.display()))
}

/// Handle on the fixture's test hooks.
struct Fixture {
    lib: libloading::Library,
}

impl Fixture {
    fn load() -> Self {
        let lib = unsafe { libloading::Library::new(fixture_path()) }.unwrap();
        let fixture = Self { lib };
        fixture.call0::<()>(b"fixture_reset\0");
        fixture
    }

    fn call0<R>(&self, symbol: &[u8]) -> R {
        let f: libloading::Symbol<'_, unsafe extern "C" fn() -> R> =
            unsafe { self.lib.get(symbol) }.unwrap();
        unsafe { f() }
    }

    fn fail_unregister(&self, fail: bool) {
        let f: libloading::Symbol<'_, unsafe extern "C" fn(bool)> =
            unsafe { self.lib.get(b"fixture_fail_unregister\0") }.unwrap();
        unsafe { f(fail) }
    }

    fn live_managers(&self) -> usize {
        self.call0(b"fixture_live_managers\0")
    }

    fn live_proxies(&self) -> usize {
        self.call0(b"fixture_live_proxies\0")
    }

    fn registered(&self) -> usize {
        self.call0(b"fixture_registered\0")
    }

    /// Fire `method` with a payload of `type_name`; `None` text passes null.
    fn emit(&self, method: &str, type_name: &str, text: Option<&str>) -> usize {
        let f: libloading::Symbol<
            '_,
            unsafe extern "C" fn(*const c_char, *const c_char, *const c_char) -> usize,
        > = unsafe { self.lib.get(b"fixture_emit\0") }.unwrap();

        let method = CString::new(method).unwrap();
        let type_name = CString::new(type_name).unwrap();
        let text = text.map(|t| CString::new(t).unwrap());
        let text_ptr = text.as_ref().map_or(ptr::null(), |t| t.as_ptr());
        unsafe { f(method.as_ptr(), type_name.as_ptr(), text_ptr) }
    }

    fn emit_decode(&self, text: &str) -> usize {
        self.emit("onRead", DECODE_RESULT, Some(text))
    }
}

fn runtime() -> DynamicRuntime {
    DynamicRuntime::open(&fixture_path()).unwrap()
}

fn bridge() -> ScannerBridge {
    ScannerBridge::new(Arc::new(runtime()), HostContext::null(), SdkNames::default())
}

fn recorder() -> (Arc<dyn ScanSink>, Arc<Mutex<Vec<String>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = Arc::clone(&seen);
    let sink: Arc<dyn ScanSink> = Arc::new(move |barcode: String| {
        seen_clone.lock().push(barcode);
    });
    (sink, seen)
}

#[test]
#[serial]
fn test_resolves_fixture_types() {
    let _fixture = Fixture::load();
    let runtime = runtime();

    assert!(runtime.resolve_type("com.datalogic.decode.BarcodeManager").is_ok());
    assert!(runtime.resolve_type("com.datalogic.decode.ReadListener").is_ok());
    assert!(matches!(
        runtime.resolve_type("com.datalogic.decode.ScannerProperties"),
        Err(RuntimeError::TypeNotFound { .. })
    ));
    assert!(matches!(
        runtime.construct("com.datalogic.decode.ReadListener", &HostContext::null()),
        Err(RuntimeError::MemberNotFound { .. })
    ));
}

#[test]
#[serial]
fn test_init_decode_dispose() {
    let fixture = Fixture::load();
    let managers = fixture.live_managers();
    let proxies = fixture.live_proxies();

    let bridge = bridge();
    assert!(bridge.is_available());
    let (sink, seen) = recorder();
    bridge.subscribe(&sink);

    bridge.init_scanner().unwrap();
    assert_eq!(fixture.registered(), 1);
    assert_eq!(fixture.live_managers(), managers + 1);
    assert_eq!(fixture.live_proxies(), proxies + 1);

    fixture.emit_decode("111");
    fixture.emit_decode("222");
    assert_eq!(*seen.lock(), vec!["111".to_string(), "222".to_string()]);

    bridge.dispose_scanner().unwrap();
    assert_eq!(fixture.registered(), 0);
    assert_eq!(fixture.live_managers(), managers);
    assert_eq!(fixture.live_proxies(), proxies);

    assert_eq!(fixture.emit_decode("333"), 0);
    assert_eq!(seen.lock().len(), 2);
}

#[test]
#[serial]
fn test_null_payload_is_dropped() {
    let fixture = Fixture::load();
    let bridge = bridge();
    let (sink, seen) = recorder();
    bridge.subscribe(&sink);
    bridge.init_scanner().unwrap();

    assert_eq!(fixture.emit("onRead", DECODE_RESULT, None), 1);
    assert!(seen.lock().is_empty());

    fixture.emit_decode("after-null");
    assert_eq!(*seen.lock(), vec!["after-null".to_string()]);
    bridge.dispose_scanner().unwrap();
}

#[test]
#[serial]
fn test_payload_without_accessor_is_dropped() {
    let fixture = Fixture::load();
    let bridge = bridge();
    let (sink, seen) = recorder();
    bridge.subscribe(&sink);
    bridge.init_scanner().unwrap();

    // No `<Type>_getText` symbol is exported for this type.
    fixture.emit("onRead", "com.datalogic.decode.ImageResult", Some("hidden"));
    // Other listener methods are ignored.
    fixture.emit("onTimeout", DECODE_RESULT, Some("timeout"));
    assert!(seen.lock().is_empty());

    fixture.emit_decode("visible");
    assert_eq!(*seen.lock(), vec!["visible".to_string()]);
    bridge.dispose_scanner().unwrap();
}

#[test]
#[serial]
fn test_refused_unregister_keeps_listener_callable() {
    let fixture = Fixture::load();
    let proxies = fixture.live_proxies();
    let managers = fixture.live_managers();

    let bridge = bridge();
    let (sink, seen) = recorder();
    bridge.subscribe(&sink);
    bridge.init_scanner().unwrap();

    fixture.emit_decode("LATE");
    assert_eq!(*seen.lock(), vec!["LATE".to_string()]);

    fixture.fail_unregister(true);
    let err = bridge.dispose_scanner().unwrap_err();
    assert_eq!(err.error_code(), "DISPOSE_ERROR");
    match &err {
        DisposeError::Failure(RuntimeError::Invocation { method, message, .. }) => {
            assert_eq!(method, "removeReadListener");
            assert_eq!(message, "listener is busy");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!bridge.is_initialized());
    assert_eq!(fixture.live_managers(), managers);

    // The engine still calls the listener it kept; the proxy must still be
    // alive and the call must deliver nothing.
    assert_eq!(fixture.live_proxies(), proxies + 1);
    assert_eq!(fixture.emit_decode("AFTER"), 1);
    assert_eq!(*seen.lock(), vec!["LATE".to_string()]);

    fixture.call0::<()>(b"fixture_reset\0");
}
