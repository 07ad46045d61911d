//! Host application surface: named operations, the event channel, and the
//! attach/detach lifecycle.
//!
//! The host shell owns the request/response transport. It hands the plugin a
//! [`BinaryMessenger`] on attach; the plugin registers itself as the
//! [`MethodCallHandler`] of the method channel and as the [`StreamHandler`] of
//! the event channel.
//!
//! | Method | Success | Failure codes |
//! |---|---|---|
//! | `isDatalogicScannerAvailable` | `bool` | never fails |
//! | `initScanner` | `true` | `NOT_AVAILABLE`, `INIT_ERROR`, `ALREADY_INITIALIZED` |
//! | `disposeScanner` | `true` (`false` if SDK absent) | `DISPOSE_ERROR` |
//! | anything else | not implemented | |

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::bridge::ScannerBridge;
use crate::config::BridgeConfig;
use crate::runtime::{self, HostContext, VendorRuntime};
use crate::stream::ScanSink;

/// Availability query.
pub const METHOD_IS_AVAILABLE: &str = "isDatalogicScannerAvailable";
/// Hardware listener initialization.
pub const METHOD_INIT: &str = "initScanner";
/// Hardware listener teardown.
pub const METHOD_DISPOSE: &str = "disposeScanner";

/// A request arriving on the method channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    /// Operation name
    pub method: String,
    /// Operation arguments; unused by every current operation
    #[serde(default)]
    pub arguments: Value,
}

impl MethodCall {
    /// A call without arguments.
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            arguments: Value::Null,
        }
    }
}

/// Reply to a [`MethodCall`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MethodResponse {
    /// Successful result
    Success {
        /// Result value
        result: Value,
    },
    /// Tagged failure
    Error {
        /// Failure code, e.g. `INIT_ERROR`
        code: String,
        /// Human-readable cause
        message: String,
        /// Extra details, always null today
        details: Value,
    },
    /// The method is not known
    NotImplemented,
}

impl MethodResponse {
    /// Successful reply carrying `result`.
    pub fn success(result: impl Into<Value>) -> Self {
        Self::Success {
            result: result.into(),
        }
    }

    /// Failure reply.
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.to_string(),
            message: message.into(),
            details: Value::Null,
        }
    }

    /// Failure code, if this is an error reply.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            Self::Error { code, .. } => Some(code),
            _ => None,
        }
    }
}

/// Handles requests on a method channel.
pub trait MethodCallHandler: Send + Sync {
    /// Handle one call synchronously.
    fn on_method_call(&self, call: &MethodCall) -> MethodResponse;
}

/// Handles subscription on an event channel.
pub trait StreamHandler: Send + Sync {
    /// The host started listening; `sink` replaces any previous listener.
    fn on_listen(&self, arguments: &Value, sink: &Arc<dyn ScanSink>);

    /// The host stopped listening.
    fn on_cancel(&self, arguments: &Value);
}

/// Channel registry provided by the host shell.
pub trait BinaryMessenger: Send + Sync {
    /// Install or clear (`None`) the handler of a method channel.
    fn set_method_call_handler(&self, channel: &str, handler: Option<Arc<dyn MethodCallHandler>>);

    /// Install or clear (`None`) the handler of an event channel.
    fn set_stream_handler(&self, channel: &str, handler: Option<Arc<dyn StreamHandler>>);
}

/// What the host provides on attach.
#[derive(Clone)]
pub struct PluginBinding {
    /// Application context handed to the vendor manager
    pub context: HostContext,
    /// Channel registry
    pub messenger: Arc<dyn BinaryMessenger>,
}

/// Operation dispatch over a [`ScannerBridge`].
pub struct ScannerChannel {
    bridge: ScannerBridge,
}

impl ScannerChannel {
    /// Wrap `bridge`.
    pub fn new(bridge: ScannerBridge) -> Self {
        Self { bridge }
    }

    /// The underlying bridge.
    pub fn bridge(&self) -> &ScannerBridge {
        &self.bridge
    }
}

impl MethodCallHandler for ScannerChannel {
    fn on_method_call(&self, call: &MethodCall) -> MethodResponse {
        debug!(method = %call.method, "Method call");
        match call.method.as_str() {
            METHOD_IS_AVAILABLE => MethodResponse::success(self.bridge.is_available()),
            METHOD_INIT => match self.bridge.init_scanner() {
                Ok(()) => MethodResponse::success(true),
                Err(e) => MethodResponse::error(e.error_code(), e.to_string()),
            },
            METHOD_DISPOSE => {
                if !self.bridge.is_available() {
                    return MethodResponse::success(false);
                }
                match self.bridge.dispose_scanner() {
                    Ok(()) => MethodResponse::success(true),
                    Err(e) => MethodResponse::error(e.error_code(), e.to_string()),
                }
            }
            _ => MethodResponse::NotImplemented,
        }
    }
}

impl StreamHandler for ScannerChannel {
    fn on_listen(&self, _arguments: &Value, sink: &Arc<dyn ScanSink>) {
        self.bridge.subscribe(sink);
    }

    fn on_cancel(&self, _arguments: &Value) {
        self.bridge.unsubscribe();
    }
}

struct Attachment {
    channel: Arc<ScannerChannel>,
    messenger: Arc<dyn BinaryMessenger>,
}

/// The plugin instance the host attaches and detaches.
pub struct DatalogicScannerPlugin {
    config: BridgeConfig,
    runtime_factory: Box<dyn Fn(&BridgeConfig) -> Arc<dyn VendorRuntime> + Send + Sync>,
    attachment: Mutex<Option<Attachment>>,
}

impl DatalogicScannerPlugin {
    /// Plugin discovering the vendor library from `config` on attach.
    pub fn new(config: BridgeConfig) -> Self {
        Self::with_runtime_factory(config, |config| runtime::discover(&config.sdk))
    }

    /// Plugin using a fixed runtime, e.g. the mock SDK.
    pub fn with_runtime(config: BridgeConfig, runtime: Arc<dyn VendorRuntime>) -> Self {
        Self::with_runtime_factory(config, move |_| Arc::clone(&runtime))
    }

    fn with_runtime_factory(
        config: BridgeConfig,
        factory: impl Fn(&BridgeConfig) -> Arc<dyn VendorRuntime> + Send + Sync + 'static,
    ) -> Self {
        Self {
            config,
            runtime_factory: Box::new(factory),
            attachment: Mutex::new(None),
        }
    }

    /// Attach to the host: detect capability and open both channels.
    ///
    /// Attaching again first detaches the previous attachment.
    pub fn on_attached(&self, binding: PluginBinding) {
        self.on_detached();

        let runtime = (self.runtime_factory)(&self.config);
        let bridge = ScannerBridge::new(runtime, binding.context, self.config.sdk.names.clone());
        info!(
            runtime = bridge.runtime_name(),
            available = bridge.is_available(),
            "Scanner plugin attached"
        );

        let channel = Arc::new(ScannerChannel::new(bridge));
        let method_handler: Arc<dyn MethodCallHandler> = Arc::clone(&channel) as _;
        let stream_handler: Arc<dyn StreamHandler> = Arc::clone(&channel) as _;
        binding
            .messenger
            .set_method_call_handler(&self.config.channels.method, Some(method_handler));
        binding
            .messenger
            .set_stream_handler(&self.config.channels.events, Some(stream_handler));

        *self.attachment.lock() = Some(Attachment {
            channel,
            messenger: binding.messenger,
        });
    }

    /// Detach from the host: close both channels and dispose the scanner.
    ///
    /// The dispose result is logged and otherwise ignored.
    pub fn on_detached(&self) {
        let Some(attachment) = self.attachment.lock().take() else {
            return;
        };

        attachment
            .messenger
            .set_method_call_handler(&self.config.channels.method, None);
        attachment
            .messenger
            .set_stream_handler(&self.config.channels.events, None);

        if let Err(e) = attachment.channel.bridge().dispose_scanner() {
            warn!(error = %e, "Dispose on detach failed");
        }
        info!("Scanner plugin detached");
    }

    /// The active channel, if attached.
    pub fn channel(&self) -> Option<Arc<ScannerChannel>> {
        self.attachment
            .lock()
            .as_ref()
            .map(|a| Arc::clone(&a.channel))
    }
}

impl Drop for DatalogicScannerPlugin {
    fn drop(&mut self) {
        self.on_detached();
    }
}
