//! `scanner-bridge`
//!
//! Hardware-abstraction bridge exposing the Datalogic barcode scanner to a
//! host application without ever linking the vendor SDK.
//!
//! The SDK is an optional shared library that may be missing at build time
//! and at run time. The bridge looks it up once, caches whether it is usable,
//! and from then on talks to it only by name through a
//! [`VendorRuntime`](runtime::VendorRuntime).
//!
//! ## Components
//!
//! - [`capability`]: one-shot detection of the SDK's entry type
//! - [`runtime`]: name-based access to the SDK (dynamic library, absent, mock)
//! - [`proxy`]: the decode listener's invocation handler
//! - [`stream`]: single-subscriber delivery of decoded text
//! - [`bridge`]: [`ScannerBridge`] with `init_scanner` / `dispose_scanner`
//! - [`plugin`]: named operations, event channel and attach/detach for hosts
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use scanner_bridge::config::BridgeConfig;
//! use scanner_bridge::plugin::{DatalogicScannerPlugin, PluginBinding};
//! # use scanner_bridge::plugin::BinaryMessenger;
//! # fn host_messenger() -> Arc<dyn BinaryMessenger> { unimplemented!() }
//!
//! let plugin = DatalogicScannerPlugin::new(BridgeConfig::load()?);
//! plugin.on_attached(PluginBinding {
//!     context: scanner_bridge::HostContext::null(),
//!     messenger: host_messenger(),
//! });
//! // ... host calls `initScanner`, listens on the event channel ...
//! plugin.on_detached();
//! # Ok::<(), scanner_bridge::error::ConfigError>(())
//! ```

pub mod bridge;
pub mod capability;
pub mod config;
pub mod error;
pub mod logging;
#[cfg(feature = "mock")]
pub mod mock;
pub mod plugin;
pub mod proxy;
pub mod runtime;
pub mod stream;

pub use bridge::ScannerBridge;
pub use config::{BridgeConfig, SdkNames};
pub use error::{DisposeError, InitError, RuntimeError};
pub use runtime::{HostContext, VendorRuntime};
pub use stream::{ScanSink, ScanStream};
