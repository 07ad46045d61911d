//! Decode callbacks racing the lifecycle operations.

#![cfg(feature = "mock")]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use scanner_bridge::mock::MockSdk;
use scanner_bridge::{HostContext, ScanSink, ScannerBridge, SdkNames};

fn counting_sink() -> (Arc<dyn ScanSink>, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let count_clone = Arc::clone(&count);
    let sink: Arc<dyn ScanSink> = Arc::new(move |_barcode: String| {
        count_clone.fetch_add(1, Ordering::SeqCst);
    });
    (sink, count)
}

#[test]
fn test_dispose_while_emitting() {
    let sdk = MockSdk::present();
    let bridge = Arc::new(ScannerBridge::new(
        Arc::new(sdk.clone()),
        HostContext::null(),
        SdkNames::default(),
    ));
    let (sink, count) = counting_sink();
    bridge.subscribe(&sink);
    bridge.init_scanner().unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let emitter = {
        let sdk = sdk.clone();
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut sequence = 0u32;
            while !stop.load(Ordering::SeqCst) {
                sequence += 1;
                sdk.emit_decode(&format!("{sequence}"));
            }
        })
    };

    thread::sleep(Duration::from_millis(20));
    bridge.dispose_scanner().unwrap();
    let delivered = count.load(Ordering::SeqCst);

    thread::sleep(Duration::from_millis(20));
    stop.store(true, Ordering::SeqCst);
    emitter.join().expect("emitter thread panicked");

    // A delivery already in flight when dispose ran may still land.
    assert!(count.load(Ordering::SeqCst) <= delivered + 1);
    assert!(!bridge.is_initialized());
    assert_eq!(sdk.live_managers(), 0);
}

#[test]
fn test_resubscribe_while_emitting() {
    let sdk = MockSdk::present();
    let bridge = Arc::new(ScannerBridge::new(
        Arc::new(sdk.clone()),
        HostContext::null(),
        SdkNames::default(),
    ));
    bridge.init_scanner().unwrap();

    let emitter = {
        let sdk = sdk.clone();
        thread::spawn(move || {
            for i in 0..2_000 {
                sdk.emit_decode(&format!("{i}"));
            }
        })
    };

    let mut counters = Vec::new();
    for _ in 0..50 {
        let (sink, count) = counting_sink();
        bridge.subscribe(&sink);
        counters.push((sink, count));
        thread::yield_now();
    }

    emitter.join().expect("emitter thread panicked");

    let total: usize = counters
        .iter()
        .map(|(_, count)| count.load(Ordering::SeqCst))
        .sum();
    assert!(total <= 2_000);
}

#[test]
fn test_concurrent_init_registers_once() {
    let sdk = MockSdk::present();
    let bridge = Arc::new(ScannerBridge::new(
        Arc::new(sdk.clone()),
        HostContext::null(),
        SdkNames::default(),
    ));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let bridge = Arc::clone(&bridge);
            thread::spawn(move || bridge.init_scanner().is_ok())
        })
        .collect();

    let successes = handles
        .into_iter()
        .map(|h| h.join().expect("init thread panicked"))
        .filter(|ok| *ok)
        .count();

    assert_eq!(successes, 1);
    assert_eq!(sdk.constructed_managers(), 1);
    assert_eq!(sdk.registered_listeners(), 1);
}
