//! The dynamic scanner bridge.
//!
//! [`ScannerBridge`] owns the optional vendor manager and listener handles
//! and the single-subscriber event slot. All vendor access goes through a
//! [`VendorRuntime`], gated by a capability flag detected once at
//! construction.
//!
//! # Lifecycle
//!
//! ```text
//! new() ── detect ──> available?
//!                        │
//!            init_scanner()   construct manager, build proxy, register
//!                        │
//!     decode callbacks ──┼──> EventSlot ──> subscriber
//!                        │
//!         dispose_scanner()   detach proxy, unregister, clear handles
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use scanner_bridge::{config::BridgeConfig, runtime, HostContext, ScannerBridge};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BridgeConfig::load()?;
//! let bridge = ScannerBridge::new(
//!     runtime::discover(&config.sdk),
//!     HostContext::null(),
//!     config.sdk.names.clone(),
//! );
//!
//! if bridge.is_available() {
//!     let mut scans = bridge.scan_stream();
//!     bridge.init_scanner()?;
//!     if let Some(barcode) = scans.recv().await {
//!         println!("Scanned {barcode}");
//!     }
//!     bridge.dispose_scanner()?;
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::capability;
use crate::config::SdkNames;
use crate::error::{DisposeError, InitError, Result as RuntimeResult};
use crate::proxy::DecodeForwarder;
use crate::runtime::{HostContext, InvocationHandler, ObjectRef, VendorRuntime};
use crate::stream::{EventSlot, ScanSink, ScanStream};

/// Manager and listener are set and cleared together.
#[derive(Default)]
struct NativeHandles {
    manager: Option<ObjectRef>,
    listener: Option<ObjectRef>,
    forwarder: Option<Arc<DecodeForwarder>>,
}

impl NativeHandles {
    fn is_empty(&self) -> bool {
        self.manager.is_none() && self.listener.is_none()
    }
}

/// Bridge between the host application and the optional scanner SDK.
pub struct ScannerBridge {
    runtime: Arc<dyn VendorRuntime>,
    context: HostContext,
    names: SdkNames,
    available: bool,
    handles: Mutex<NativeHandles>,
    events: Arc<EventSlot>,
}

impl ScannerBridge {
    /// Create a bridge and detect SDK capability once.
    pub fn new(runtime: Arc<dyn VendorRuntime>, context: HostContext, names: SdkNames) -> Self {
        let available = capability::detect(runtime.as_ref(), &names.manager_type);
        Self {
            runtime,
            context,
            names,
            available,
            handles: Mutex::new(NativeHandles::default()),
            events: Arc::new(EventSlot::new()),
        }
    }

    /// Cached capability flag.
    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Whether a manager and listener are currently registered.
    pub fn is_initialized(&self) -> bool {
        !self.handles.lock().is_empty()
    }

    /// Description of the runtime backing this bridge.
    pub fn runtime_name(&self) -> &str {
        self.runtime.name()
    }

    /// Construct the vendor manager and register the decode listener.
    ///
    /// On failure nothing stays registered: a manager constructed before the
    /// failing step is released again.
    pub fn init_scanner(&self) -> Result<(), InitError> {
        if !self.available {
            return Err(InitError::NotAvailable);
        }

        let mut handles = self.handles.lock();
        if !handles.is_empty() {
            warn!("initScanner called while already initialized");
            return Err(InitError::AlreadyInitialized);
        }

        let (manager, listener, forwarder) = self.attach_listener().map_err(|e| {
            error!(error = %e, "Error initializing Datalogic scanner");
            InitError::Failure(e)
        })?;

        *handles = NativeHandles {
            manager: Some(manager),
            listener: Some(listener),
            forwarder: Some(forwarder),
        };
        info!(runtime = self.runtime.name(), "Datalogic scanner initialized successfully");
        Ok(())
    }

    fn attach_listener(&self) -> RuntimeResult<(ObjectRef, ObjectRef, Arc<DecodeForwarder>)> {
        let manager = self
            .runtime
            .construct(&self.names.manager_type, &self.context)?;

        let forwarder = Arc::new(DecodeForwarder::new(&self.names, Arc::clone(&self.events)));
        let handler: Arc<dyn InvocationHandler> = Arc::clone(&forwarder) as _;
        let listener = self.runtime.proxy(&self.names.listener_type, handler)?;

        if let Err(e) = self
            .runtime
            .invoke(&manager, &self.names.register_method, &listener)
        {
            forwarder.detach();
            return Err(e);
        }

        Ok((manager, listener, forwarder))
    }

    /// Unregister the listener and release both handles.
    ///
    /// Idempotent: succeeds without doing anything when the SDK is absent or
    /// nothing is registered. The handles are cleared even when unregistering
    /// fails; the failure is still reported.
    pub fn dispose_scanner(&self) -> Result<(), DisposeError> {
        if !self.available {
            return Ok(());
        }

        let mut handles = self.handles.lock();
        let NativeHandles {
            manager,
            listener,
            forwarder,
        } = std::mem::take(&mut *handles);

        if let Some(forwarder) = forwarder {
            forwarder.detach();
        }

        let (Some(manager), Some(listener)) = (manager, listener) else {
            return Ok(());
        };

        let result = self
            .runtime
            .invoke(&manager, &self.names.unregister_method, &listener);
        drop(handles);

        match result {
            Ok(()) => {
                info!("Datalogic scanner disposed successfully");
                Ok(())
            }
            Err(e) => {
                // The SDK still holds the listener it failed to unregister and
                // may keep calling it. Releasing the proxy would free its
                // handler table under those calls, so it is leaked instead;
                // the detached forwarder turns any further call into a no-op.
                std::mem::forget(listener);
                error!(error = %e, "Error disposing Datalogic scanner");
                Err(DisposeError::Failure(e))
            }
        }
    }

    /// Make `sink` the single subscriber, replacing any previous one.
    ///
    /// Only a weak reference is kept; the caller owns `sink`.
    pub fn subscribe(&self, sink: &Arc<dyn ScanSink>) {
        self.events.subscribe(sink);
    }

    /// Clear the subscriber. Later scans are dropped.
    pub fn unsubscribe(&self) {
        self.events.unsubscribe();
    }

    /// Subscribe a fresh [`ScanStream`], replacing any previous subscriber.
    pub fn scan_stream(&self) -> ScanStream {
        let stream = ScanStream::new();
        self.events.subscribe(stream.sink());
        stream
    }

    /// The subscriber slot fed by decode callbacks.
    pub fn events(&self) -> &Arc<EventSlot> {
        &self.events
    }
}

impl Drop for ScannerBridge {
    fn drop(&mut self) {
        if self.handles.get_mut().is_empty() {
            return;
        }
        if let Err(e) = self.dispose_scanner() {
            warn!(error = %e, "Dispose on drop failed");
        }
    }
}

impl std::fmt::Debug for ScannerBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScannerBridge")
            .field("runtime", &self.runtime.name())
            .field("available", &self.available)
            .field("initialized", &self.is_initialized())
            .field("context", &self.context)
            .finish()
    }
}
