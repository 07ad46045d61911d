//! Plugin attach/detach against a recording host messenger.

#![cfg(feature = "mock")]

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use scanner_bridge::config::BridgeConfig;
use scanner_bridge::mock::MockSdk;
use scanner_bridge::plugin::{
    BinaryMessenger, DatalogicScannerPlugin, MethodCall, MethodCallHandler, MethodResponse,
    PluginBinding, StreamHandler, METHOD_DISPOSE, METHOD_INIT, METHOD_IS_AVAILABLE,
};
use scanner_bridge::runtime::AbsentRuntime;
use scanner_bridge::{HostContext, ScanSink};
use serde_json::Value;

const METHOD_CHANNEL: &str = "com.quilmedic/datalogic_scanner";
const EVENT_CHANNEL: &str = "com.quilmedic/datalogic_scanner_events";

#[derive(Default)]
struct RecordingMessenger {
    method_handlers: Mutex<HashMap<String, Arc<dyn MethodCallHandler>>>,
    stream_handlers: Mutex<HashMap<String, Arc<dyn StreamHandler>>>,
}

impl RecordingMessenger {
    fn call(&self, method: &str) -> Option<MethodResponse> {
        let handler = self.method_handlers.lock().get(METHOD_CHANNEL).cloned()?;
        Some(handler.on_method_call(&MethodCall::new(method)))
    }

    fn stream_handler(&self) -> Option<Arc<dyn StreamHandler>> {
        self.stream_handlers.lock().get(EVENT_CHANNEL).cloned()
    }
}

impl BinaryMessenger for RecordingMessenger {
    fn set_method_call_handler(&self, channel: &str, handler: Option<Arc<dyn MethodCallHandler>>) {
        let mut handlers = self.method_handlers.lock();
        match handler {
            Some(handler) => handlers.insert(channel.to_string(), handler),
            None => handlers.remove(channel),
        };
    }

    fn set_stream_handler(&self, channel: &str, handler: Option<Arc<dyn StreamHandler>>) {
        let mut handlers = self.stream_handlers.lock();
        match handler {
            Some(handler) => handlers.insert(channel.to_string(), handler),
            None => handlers.remove(channel),
        };
    }
}

fn attach(plugin: &DatalogicScannerPlugin) -> Arc<RecordingMessenger> {
    let messenger = Arc::new(RecordingMessenger::default());
    plugin.on_attached(PluginBinding {
        context: HostContext::null(),
        messenger: Arc::clone(&messenger) as Arc<dyn BinaryMessenger>,
    });
    messenger
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
fn test_attach_registers_both_channels() {
    let plugin =
        DatalogicScannerPlugin::with_runtime(BridgeConfig::default(), Arc::new(MockSdk::present()));
    let messenger = attach(&plugin);

    assert!(messenger.method_handlers.lock().contains_key(METHOD_CHANNEL));
    assert!(messenger.stream_handler().is_some());
    assert!(plugin.channel().is_some());
}

#[test]
fn test_full_session_over_channels() {
    let sdk = MockSdk::present();
    let plugin =
        DatalogicScannerPlugin::with_runtime(BridgeConfig::default(), Arc::new(sdk.clone()));
    let messenger = attach(&plugin);

    assert_eq!(
        messenger.call(METHOD_IS_AVAILABLE),
        Some(MethodResponse::success(true))
    );

    let (sink, seen) = recorder();
    messenger
        .stream_handler()
        .unwrap()
        .on_listen(&Value::Null, &sink);

    assert_eq!(messenger.call(METHOD_INIT), Some(MethodResponse::success(true)));
    sdk.emit_decode("111");
    sdk.emit_decode("222");
    assert_eq!(*seen.lock(), vec!["111".to_string(), "222".to_string()]);

    messenger.stream_handler().unwrap().on_cancel(&Value::Null);
    sdk.emit_decode("333");
    assert_eq!(seen.lock().len(), 2);

    assert_eq!(
        messenger.call(METHOD_DISPOSE),
        Some(MethodResponse::success(true))
    );
    assert_eq!(sdk.registered_listeners(), 0);
}

#[test]
fn test_absent_sdk_over_channels() {
    let plugin = DatalogicScannerPlugin::with_runtime(
        BridgeConfig::default(),
        Arc::new(AbsentRuntime::new()),
    );
    let messenger = attach(&plugin);

    assert_eq!(
        messenger.call(METHOD_IS_AVAILABLE),
        Some(MethodResponse::success(false))
    );
    assert_eq!(
        messenger.call(METHOD_INIT).as_ref().and_then(|r| r.error_code()),
        Some("NOT_AVAILABLE")
    );
    assert_eq!(
        messenger.call(METHOD_DISPOSE),
        Some(MethodResponse::success(false))
    );
    assert_eq!(
        messenger.call("getScannerInfo"),
        Some(MethodResponse::NotImplemented)
    );
}

#[test]
fn test_detach_clears_channels_and_disposes() {
    let sdk = MockSdk::present();
    let plugin =
        DatalogicScannerPlugin::with_runtime(BridgeConfig::default(), Arc::new(sdk.clone()));
    let messenger = attach(&plugin);
    messenger.call(METHOD_INIT);
    assert_eq!(sdk.registered_listeners(), 1);

    plugin.on_detached();

    assert!(messenger.method_handlers.lock().is_empty());
    assert!(messenger.stream_handlers.lock().is_empty());
    assert!(plugin.channel().is_none());
    assert_eq!(sdk.registered_listeners(), 0);
    assert_eq!(sdk.live_managers(), 0);

    // Detaching twice is harmless.
    plugin.on_detached();
}

#[test]
fn test_reattach_replaces_previous_attachment() {
    let sdk = MockSdk::present();
    let plugin =
        DatalogicScannerPlugin::with_runtime(BridgeConfig::default(), Arc::new(sdk.clone()));
    let first = attach(&plugin);
    first.call(METHOD_INIT);

    let second = attach(&plugin);
    assert!(first.method_handlers.lock().is_empty());
    assert_eq!(sdk.registered_listeners(), 0);

    assert_eq!(second.call(METHOD_INIT), Some(MethodResponse::success(true)));
    assert_eq!(sdk.registered_listeners(), 1);
}

#[test]
fn test_drop_detaches() {
    let sdk = MockSdk::present();
    let messenger = {
        let plugin =
            DatalogicScannerPlugin::with_runtime(BridgeConfig::default(), Arc::new(sdk.clone()));
        let messenger = attach(&plugin);
        messenger.call(METHOD_INIT);
        messenger
    };

    assert!(messenger.method_handlers.lock().is_empty());
    assert_eq!(sdk.live_managers(), 0);
}
