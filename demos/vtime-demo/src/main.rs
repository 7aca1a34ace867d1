//! Demonstrates a worker thread parked in a virtual sleep being released
//! by the main thread driving the clock forward, matching the advance
//! scenario a test harness exercises against a subject process.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration as WallDuration;

use vtime_shim::attach_client;

fn main() {
    tracing_subscriber::fmt::init();

    println!("=== vtime demo ===\n");

    let _client = attach_client();
    println!("client attached, virtual time is now {:?}", vtime_shim::now());

    let woke = Arc::new(AtomicBool::new(false));
    let worker_woke = woke.clone();
    let worker = thread::spawn(move || {
        println!("[worker] sleeping for 3 virtual seconds");
        unsafe {
            vtime_shim::overrides::sleep(3);
        }
        println!("[worker] woke up");
        worker_woke.store(true, Ordering::SeqCst);
    });

    // Give the worker a moment to actually enter the intercepted sleep
    // before we advance past it.
    thread::sleep(WallDuration::from_millis(50));
    assert!(!woke.load(Ordering::SeqCst), "worker should still be asleep");

    println!("[main] advancing virtual time by 3 seconds");
    vtime_shim::advance(3_000_000_000).expect("advance");

    worker.join().unwrap();
    assert!(woke.load(Ordering::SeqCst));

    println!("\nfinal virtual time: {:?}", vtime_shim::now());
    println!("=== done ===");
}
