//! Single-subscriber delivery of decoded barcodes.
//!
//! [`EventSlot`] holds at most one downstream consumer. Subscribing replaces
//! the previous consumer without notifying it; events that arrive while the
//! slot is empty are dropped. The slot holds only a weak reference, so the
//! consumer's lifetime stays with whoever subscribed it.

use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use futures::Stream;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::trace;

/// Downstream consumer of decoded barcode text.
pub trait ScanSink: Send + Sync {
    /// Called once per decoded barcode, on the SDK's callback thread.
    fn on_scan(&self, barcode: String);
}

impl<F> ScanSink for F
where
    F: Fn(String) + Send + Sync,
{
    fn on_scan(&self, barcode: String) {
        self(barcode)
    }
}

/// Replace-on-subscribe slot for the single active [`ScanSink`].
#[derive(Default)]
pub struct EventSlot {
    subscriber: RwLock<Option<Weak<dyn ScanSink>>>,
}

impl EventSlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `sink` the current subscriber, replacing any previous one.
    pub fn subscribe(&self, sink: &Arc<dyn ScanSink>) {
        *self.subscriber.write() = Some(Arc::downgrade(sink));
    }

    /// Clear the slot.
    pub fn unsubscribe(&self) {
        *self.subscriber.write() = None;
    }

    /// Whether a live subscriber is registered.
    pub fn has_subscriber(&self) -> bool {
        self.subscriber
            .read()
            .as_ref()
            .is_some_and(|weak| weak.strong_count() > 0)
    }

    /// Deliver `barcode` to the current subscriber.
    ///
    /// Returns `false` if there was nobody to deliver to. The slot is read
    /// once; the sink runs without the lock held.
    pub fn forward(&self, barcode: String) -> bool {
        let snapshot = self.subscriber.read().clone();
        match snapshot.and_then(|weak| weak.upgrade()) {
            Some(sink) => {
                sink.on_scan(barcode);
                true
            }
            None => {
                trace!("No subscriber, scan dropped");
                false
            }
        }
    }
}

impl std::fmt::Debug for EventSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSlot")
            .field("has_subscriber", &self.has_subscriber())
            .finish()
    }
}

struct ChannelSink {
    tx: mpsc::UnboundedSender<String>,
}

impl ScanSink for ChannelSink {
    fn on_scan(&self, barcode: String) {
        // Receiver gone means the stream was dropped mid-delivery.
        let _ = self.tx.send(barcode);
    }
}

/// Async stream of decoded barcodes.
///
/// Owns the sink it was subscribed with; dropping the stream ends delivery
/// even if the slot still points at it.
pub struct ScanStream {
    sink: Arc<dyn ScanSink>,
    rx: mpsc::UnboundedReceiver<String>,
}

impl ScanStream {
    /// Create a stream and the sink to subscribe with.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            sink: Arc::new(ChannelSink { tx }),
            rx,
        }
    }

    /// The sink feeding this stream.
    pub fn sink(&self) -> &Arc<dyn ScanSink> {
        &self.sink
    }

    /// Wait for the next barcode.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Take a barcode if one is already queued.
    pub fn try_recv(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }
}

impl Default for ScanStream {
    fn default() -> Self {
        Self::new()
    }
}

impl Stream for ScanStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        self.rx.poll_recv(cx)
    }
}
