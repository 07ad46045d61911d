//! In-process simulation of the Datalogic SDK.
//!
//! [`MockSdk`] implements [`VendorRuntime`] without any native library, so the
//! bridge can be exercised in tests and on machines without a scanner. It
//! models the parts of the SDK the bridge touches: a manager type constructed
//! from the host context, a listener interface built as a proxy, register and
//! unregister methods, and decode payloads with a text accessor.
//!
//! Failures can be injected per operation with [`FaultConfig`]. Operation
//! keys are `construct`, `proxy` and `invoke:<method>`.
//!
//! ```
//! use std::sync::Arc;
//! use scanner_bridge::{mock::MockSdk, HostContext, ScannerBridge, SdkNames};
//!
//! let sdk = MockSdk::present();
//! let bridge = ScannerBridge::new(Arc::new(sdk.clone()), HostContext::null(), SdkNames::default());
//! let mut scans = bridge.scan_stream();
//!
//! bridge.init_scanner().unwrap();
//! sdk.emit_decode("ABC123");
//! assert_eq!(scans.try_recv().as_deref(), Some("ABC123"));
//! ```

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use crate::config::SdkNames;
use crate::error::{Result, RuntimeError};
use crate::runtime::{HostContext, InvocationHandler, NativeObject, ObjectRef, VendorRuntime};

/// Type name reported by mock decode payloads.
pub const PAYLOAD_TYPE: &str = "com.datalogic.decode.DecodeResult";

/// Failure injection configuration for the mock SDK
#[derive(Clone, Debug, Default)]
pub struct FaultConfig {
    scenarios: Arc<Vec<FaultScenario>>,
    counts: Arc<Mutex<HashMap<String, u32>>>,
}

/// A single injected failure.
#[derive(Debug, Clone)]
pub enum FaultScenario {
    /// Fail every call of `operation`
    FailOn {
        /// Operation key, e.g. `invoke:addReadListener`
        operation: &'static str,
    },
    /// Fail after N successful calls of `operation`
    FailAfterN {
        /// Operation key
        operation: &'static str,
        /// Calls that succeed before failures start
        count: u32,
    },
}

impl FaultConfig {
    /// No injected failures
    pub fn none() -> Self {
        Self::default()
    }

    /// A single scenario
    pub fn scenario(scenario: FaultScenario) -> Self {
        Self::scenarios(vec![scenario])
    }

    /// Multiple scenarios
    pub fn scenarios(scenarios: Vec<FaultScenario>) -> Self {
        Self {
            scenarios: Arc::new(scenarios),
            counts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Check if `operation` should fail, returning the failure message.
    pub fn check_operation(&self, operation: &str) -> std::result::Result<(), String> {
        let mut counts = self.counts.lock();
        for scenario in self.scenarios.iter() {
            match scenario {
                FaultScenario::FailOn { operation: op } if *op == operation => {
                    return Err(format!("Injected failure on '{operation}'"));
                }
                FaultScenario::FailAfterN {
                    operation: op,
                    count,
                } if *op == operation => {
                    let current = counts.entry(operation.to_string()).or_insert(0);
                    *current += 1;
                    if *current > *count {
                        return Err(format!(
                            "Injected failure after {count} calls of '{operation}'"
                        ));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Reset operation counters
    pub fn reset(&self) {
        self.counts.lock().clear();
    }
}

struct MockInner {
    present: bool,
    names: SdkNames,
    missing_types: HashSet<String>,
    faults: FaultConfig,
    managers: Mutex<Vec<Weak<MockManager>>>,
    constructed: AtomicUsize,
    live: Arc<AtomicUsize>,
    proxies: Arc<AtomicUsize>,
}

/// Simulated vendor SDK. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct MockSdk {
    inner: Arc<MockInner>,
}

impl MockSdk {
    fn build(present: bool) -> Self {
        Self {
            inner: Arc::new(MockInner {
                present,
                names: SdkNames::default(),
                missing_types: HashSet::new(),
                faults: FaultConfig::none(),
                managers: Mutex::new(Vec::new()),
                constructed: AtomicUsize::new(0),
                live: Arc::new(AtomicUsize::new(0)),
                proxies: Arc::new(AtomicUsize::new(0)),
            }),
        }
    }

    /// An installed SDK exporting the default Datalogic names.
    pub fn present() -> Self {
        Self::build(true)
    }

    /// No SDK installed: nothing resolves.
    pub fn absent() -> Self {
        Self::build(false)
    }

    fn reconfigure(self, apply: impl FnOnce(&mut MockInner)) -> Self {
        let mut inner = match Arc::try_unwrap(self.inner) {
            Ok(inner) => inner,
            Err(shared) => MockInner {
                present: shared.present,
                names: shared.names.clone(),
                missing_types: shared.missing_types.clone(),
                faults: shared.faults.clone(),
                managers: Mutex::new(Vec::new()),
                constructed: AtomicUsize::new(0),
                live: Arc::new(AtomicUsize::new(0)),
                proxies: Arc::new(AtomicUsize::new(0)),
            },
        };
        apply(&mut inner);
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Use different vendor names (e.g. an older SDK release).
    pub fn with_names(self, names: SdkNames) -> Self {
        self.reconfigure(|inner| inner.names = names)
    }

    /// Remove one type from the simulated SDK.
    pub fn without_type(self, type_name: &str) -> Self {
        let type_name = type_name.to_string();
        self.reconfigure(|inner| {
            inner.missing_types.insert(type_name);
        })
    }

    /// Inject failures.
    pub fn with_faults(self, faults: FaultConfig) -> Self {
        self.reconfigure(|inner| inner.faults = faults)
    }

    /// Managers constructed so far.
    pub fn constructed_managers(&self) -> usize {
        self.inner.constructed.load(Ordering::SeqCst)
    }

    /// Managers not yet released.
    pub fn live_managers(&self) -> usize {
        self.inner.live.load(Ordering::SeqCst)
    }

    /// Listener proxies not yet released.
    pub fn live_proxies(&self) -> usize {
        self.inner.proxies.load(Ordering::SeqCst)
    }

    /// Listeners registered on live managers.
    pub fn registered_listeners(&self) -> usize {
        self.live_manager_refs()
            .iter()
            .map(|m| m.listeners.lock().len())
            .sum()
    }

    fn live_manager_refs(&self) -> Vec<Arc<MockManager>> {
        let mut managers = self.inner.managers.lock();
        managers.retain(|weak| weak.strong_count() > 0);
        managers.iter().filter_map(Weak::upgrade).collect()
    }

    /// Call `method` on every registered listener, as the scan engine would.
    ///
    /// Returns the number of listeners called. No lock is held while the
    /// listeners run.
    pub fn emit(&self, method: &str, args: &[ObjectRef]) -> usize {
        let listeners: Vec<ObjectRef> = self
            .live_manager_refs()
            .iter()
            .flat_map(|m| m.listeners.lock().clone())
            .collect();

        for listener in &listeners {
            if let Some(proxy) = listener.as_any().downcast_ref::<MockProxy>() {
                trace!(method, "Mock SDK invoking listener");
                proxy.handler.invoke(method, args);
            }
        }
        listeners.len()
    }

    /// Emit a decode event carrying `text`.
    pub fn emit_decode(&self, text: &str) -> usize {
        let payload: ObjectRef = Arc::new(MockPayload::with_text(text));
        self.emit(&self.inner.names.decode_method, &[payload])
    }

    /// Emit a decode event whose payload has no text accessor.
    pub fn emit_without_text(&self) -> usize {
        let payload: ObjectRef = Arc::new(MockPayload::without_accessor());
        self.emit(&self.inner.names.decode_method, &[payload])
    }

    /// Emit `payload` through `method`.
    pub fn emit_payload(&self, method: &str, payload: MockPayload) -> usize {
        let payload: ObjectRef = Arc::new(payload);
        self.emit(method, &[payload])
    }

    fn check_type(&self, type_name: &str) -> Result<()> {
        let names = &self.inner.names;
        let known = type_name == names.manager_type || type_name == names.listener_type;
        if self.inner.present && known && !self.inner.missing_types.contains(type_name) {
            Ok(())
        } else {
            Err(RuntimeError::TypeNotFound {
                type_name: type_name.to_string(),
            })
        }
    }
}

impl std::fmt::Debug for MockSdk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSdk")
            .field("present", &self.inner.present)
            .field("live_managers", &self.live_managers())
            .finish()
    }
}

impl VendorRuntime for MockSdk {
    fn name(&self) -> &str {
        if self.inner.present {
            "mock"
        } else {
            "mock (absent)"
        }
    }

    fn resolve_type(&self, type_name: &str) -> Result<()> {
        self.check_type(type_name)
    }

    fn construct(&self, type_name: &str, _context: &HostContext) -> Result<ObjectRef> {
        self.check_type(type_name)?;
        if type_name != self.inner.names.manager_type {
            return Err(RuntimeError::MemberNotFound {
                type_name: type_name.to_string(),
                member: datalogic_sys::CONSTRUCTOR_SUFFIX.to_string(),
            });
        }
        self.inner
            .faults
            .check_operation("construct")
            .map_err(|message| RuntimeError::Construction {
                type_name: type_name.to_string(),
                message,
            })?;

        let manager = Arc::new(MockManager {
            type_name: type_name.to_string(),
            listeners: Mutex::new(Vec::new()),
            live: Arc::clone(&self.inner.live),
        });
        self.inner.constructed.fetch_add(1, Ordering::SeqCst);
        self.inner.live.fetch_add(1, Ordering::SeqCst);
        self.inner.managers.lock().push(Arc::downgrade(&manager));
        Ok(manager)
    }

    fn proxy(&self, interface: &str, handler: Arc<dyn InvocationHandler>) -> Result<ObjectRef> {
        self.check_type(interface)?;
        if interface != self.inner.names.listener_type {
            return Err(RuntimeError::TypeNotFound {
                type_name: interface.to_string(),
            });
        }
        self.inner
            .faults
            .check_operation("proxy")
            .map_err(|message| RuntimeError::Construction {
                type_name: interface.to_string(),
                message,
            })?;

        self.inner.proxies.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockProxy {
            type_name: interface.to_string(),
            handler,
            live: Arc::clone(&self.inner.proxies),
        }))
    }

    fn invoke(&self, target: &ObjectRef, method: &str, arg: &ObjectRef) -> Result<()> {
        let manager = target
            .as_any()
            .downcast_ref::<MockManager>()
            .ok_or_else(|| RuntimeError::ObjectMismatch {
                type_name: target.type_name().to_string(),
            })?;
        if arg.as_any().downcast_ref::<MockProxy>().is_none() {
            return Err(RuntimeError::ObjectMismatch {
                type_name: arg.type_name().to_string(),
            });
        }

        let names = &self.inner.names;
        if method != names.register_method && method != names.unregister_method {
            return Err(RuntimeError::MemberNotFound {
                type_name: manager.type_name.clone(),
                member: method.to_string(),
            });
        }

        self.inner
            .faults
            .check_operation(&format!("invoke:{method}"))
            .map_err(|message| RuntimeError::Invocation {
                type_name: manager.type_name.clone(),
                method: method.to_string(),
                message,
            })?;

        let mut listeners = manager.listeners.lock();
        if method == names.register_method {
            listeners.push(Arc::clone(arg));
        } else {
            listeners.retain(|l| !Arc::ptr_eq(l, arg));
        }
        Ok(())
    }
}

/// Simulated barcode manager.
struct MockManager {
    type_name: String,
    listeners: Mutex<Vec<ObjectRef>>,
    live: Arc<AtomicUsize>,
}

impl std::fmt::Debug for MockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockManager")
            .field("type_name", &self.type_name)
            .field("listeners", &self.listeners.lock().len())
            .finish()
    }
}

impl NativeObject for MockManager {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn call_text(&self, accessor: &str) -> Result<Option<String>> {
        Err(RuntimeError::MemberNotFound {
            type_name: self.type_name.clone(),
            member: accessor.to_string(),
        })
    }
}

impl Drop for MockManager {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Simulated listener proxy.
struct MockProxy {
    type_name: String,
    handler: Arc<dyn InvocationHandler>,
    live: Arc<AtomicUsize>,
}

impl Drop for MockProxy {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for MockProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockProxy")
            .field("type_name", &self.type_name)
            .finish()
    }
}

impl NativeObject for MockProxy {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn call_text(&self, accessor: &str) -> Result<Option<String>> {
        Err(RuntimeError::MemberNotFound {
            type_name: self.type_name.clone(),
            member: accessor.to_string(),
        })
    }
}

/// Simulated decode payload.
#[derive(Debug, Clone)]
pub struct MockPayload {
    accessor: Option<String>,
    text: Option<String>,
}

impl MockPayload {
    /// Payload whose `getText` returns `text`.
    pub fn with_text(text: &str) -> Self {
        Self {
            accessor: Some("getText".to_string()),
            text: Some(text.to_string()),
        }
    }

    /// Payload whose `getText` returns null.
    pub fn empty() -> Self {
        Self {
            accessor: Some("getText".to_string()),
            text: None,
        }
    }

    /// Payload without any text accessor.
    pub fn without_accessor() -> Self {
        Self {
            accessor: None,
            text: None,
        }
    }

    /// Payload exposing `text` under a different accessor name.
    pub fn with_accessor(accessor: &str, text: &str) -> Self {
        Self {
            accessor: Some(accessor.to_string()),
            text: Some(text.to_string()),
        }
    }
}

impl NativeObject for MockPayload {
    fn type_name(&self) -> &str {
        PAYLOAD_TYPE
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn call_text(&self, accessor: &str) -> Result<Option<String>> {
        if self.accessor.as_deref() == Some(accessor) {
            Ok(self.text.clone())
        } else {
            Err(RuntimeError::MemberNotFound {
                type_name: PAYLOAD_TYPE.to_string(),
                member: accessor.to_string(),
            })
        }
    }
}
