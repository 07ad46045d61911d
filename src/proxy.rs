//! Invocation handler behind the decode listener proxy.
//!
//! The vendor SDK calls the proxy for every method of its listener interface.
//! Only the decode callback matters: its first argument carries the payload,
//! whose text accessor yields the barcode. Everything else is ignored, and
//! nothing here may fail back into the SDK's thread.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use crate::config::SdkNames;
use crate::runtime::{InvocationHandler, ObjectRef};
use crate::stream::EventSlot;

/// What happened to one proxy invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Delivered to the current subscriber.
    Forwarded,
    /// Decoded but nobody was subscribed.
    NoSubscriber,
    /// Not the decode callback.
    Ignored,
    /// Payload missing, accessor failed, or text empty.
    Dropped,
    /// The forwarder was detached by dispose.
    Detached,
}

/// Forwards decode callbacks from the SDK into an [`EventSlot`].
pub struct DecodeForwarder {
    decode_method: String,
    text_accessor: String,
    events: RwLock<Option<Arc<EventSlot>>>,
}

impl DecodeForwarder {
    /// Create a forwarder delivering into `events`.
    pub fn new(names: &SdkNames, events: Arc<EventSlot>) -> Self {
        Self {
            decode_method: names.decode_method.clone(),
            text_accessor: names.text_accessor.clone(),
            events: RwLock::new(Some(events)),
        }
    }

    /// Stop forwarding. Calls arriving afterwards are dropped.
    ///
    /// Does not wait for a delivery already in progress.
    pub fn detach(&self) {
        self.events.write().take();
    }

    /// Whether [`detach`](Self::detach) has not been called yet.
    pub fn is_attached(&self) -> bool {
        self.events.read().is_some()
    }

    /// Handle one invocation and report the outcome.
    pub fn handle(&self, method: &str, args: &[ObjectRef]) -> Delivery {
        if method != self.decode_method {
            trace!(method, "Ignoring listener call");
            return Delivery::Ignored;
        }

        let Some(events) = self.events.read().clone() else {
            trace!("Decode callback after dispose, dropped");
            return Delivery::Detached;
        };

        let Some(payload) = args.first() else {
            debug!(method, "Decode callback without payload, dropped");
            return Delivery::Dropped;
        };

        let text = match payload.call_text(&self.text_accessor) {
            Ok(Some(text)) if !text.is_empty() => text,
            Ok(_) => {
                trace!(payload_type = payload.type_name(), "Decode payload has no text");
                return Delivery::Dropped;
            }
            Err(e) => {
                debug!(payload_type = payload.type_name(), error = %e, "Failed to extract barcode text");
                return Delivery::Dropped;
            }
        };

        if events.forward(text) {
            Delivery::Forwarded
        } else {
            Delivery::NoSubscriber
        }
    }
}

impl InvocationHandler for DecodeForwarder {
    fn invoke(&self, method: &str, args: &[ObjectRef]) {
        // A panicking subscriber must not unwind into the SDK.
        if panic::catch_unwind(AssertUnwindSafe(|| self.handle(method, args))).is_err() {
            warn!(method, "Scan subscriber panicked; event dropped");
        }
    }
}

impl std::fmt::Debug for DecodeForwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeForwarder")
            .field("decode_method", &self.decode_method)
            .field("text_accessor", &self.text_accessor)
            .field("attached", &self.is_attached())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, RuntimeError};
    use crate::runtime::NativeObject;
    use crate::stream::ScanSink;
    use parking_lot::Mutex;
    use std::any::Any;

    #[derive(Debug)]
    struct Payload(Result<Option<String>>);

    impl NativeObject for Payload {
        fn type_name(&self) -> &str {
            "com.datalogic.decode.DecodeResult"
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn call_text(&self, accessor: &str) -> Result<Option<String>> {
            if accessor == "getText" {
                self.0.clone()
            } else {
                Err(RuntimeError::MemberNotFound {
                    type_name: self.type_name().to_string(),
                    member: accessor.to_string(),
                })
            }
        }
    }

    fn payload(text: Result<Option<String>>) -> Vec<ObjectRef> {
        vec![Arc::new(Payload(text))]
    }

    fn setup() -> (DecodeForwarder, Arc<dyn ScanSink>, Arc<Mutex<Vec<String>>>) {
        let slot = Arc::new(EventSlot::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let sink: Arc<dyn ScanSink> = Arc::new(move |b: String| seen_clone.lock().push(b));
        slot.subscribe(&sink);
        (DecodeForwarder::new(&SdkNames::default(), slot), sink, seen)
    }

    #[test]
    fn test_forwards_decode_text() {
        let (forwarder, _sink, seen) = setup();
        let outcome = forwarder.handle("onRead", &payload(Ok(Some("ABC123".into()))));
        assert_eq!(outcome, Delivery::Forwarded);
        assert_eq!(*seen.lock(), vec!["ABC123".to_string()]);
    }

    #[test]
    fn test_ignores_other_methods() {
        let (forwarder, _sink, seen) = setup();
        let outcome = forwarder.handle("hashCode", &payload(Ok(Some("ABC123".into()))));
        assert_eq!(outcome, Delivery::Ignored);
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_drops_missing_or_empty_text() {
        let (forwarder, _sink, seen) = setup();
        assert_eq!(forwarder.handle("onRead", &[]), Delivery::Dropped);
        assert_eq!(
            forwarder.handle("onRead", &payload(Ok(None))),
            Delivery::Dropped
        );
        assert_eq!(
            forwarder.handle("onRead", &payload(Ok(Some(String::new())))),
            Delivery::Dropped
        );
        assert_eq!(
            forwarder.handle("onRead", &payload(Err(RuntimeError::Unavailable))),
            Delivery::Dropped
        );
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_detached_forwarder_drops() {
        let (forwarder, _sink, seen) = setup();
        forwarder.detach();
        assert!(!forwarder.is_attached());
        assert_eq!(
            forwarder.handle("onRead", &payload(Ok(Some("late".into())))),
            Delivery::Detached
        );
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_panicking_subscriber_is_contained() {
        let slot = Arc::new(EventSlot::new());
        let sink: Arc<dyn ScanSink> = Arc::new(|_b: String| panic!("subscriber bug"));
        slot.subscribe(&sink);
        let forwarder = DecodeForwarder::new(&SdkNames::default(), slot);

        forwarder.invoke("onRead", &payload(Ok(Some("ABC123".into()))));
    }
}
