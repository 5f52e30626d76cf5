// crates/resilience/examples/resilience_demo.rs
//! Demonstration of retry, timeout and bundling

use callwright_resilience::{
    raw_call, ApiCallable, BackoffSettings, BundleDescriptor, BundleThresholds, CallContext,
    CallError, CallSettings, Outcome, RetryOptions, StatusCode,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn main() {
    env_logger::init();

    println!("Call Decoration Demo");
    println!("====================\n");

    demo_retry();
    println!();
    demo_retry_exhausted();
    println!();
    demo_bundling();
}

fn demo_retry() {
    println!("1. Retry until the backend recovers");
    println!("-----------------------------------");

    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let call = raw_call(move |req: &Value, ctx: &CallContext| {
        let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
        println!("  Attempt {} (timeout {:?})", ctx.attempt, ctx.timeout);
        if attempt < 3 {
            Err(CallError::transport(StatusCode::Unavailable, "connection reset"))
        } else {
            Ok(json!({"name": req["name"].clone(), "state": "ACTIVE"}))
        }
    });

    let backoff = BackoffSettings::new(Duration::from_secs(5))
        .with_delays(Duration::from_millis(50), 2.0, Duration::from_millis(500))
        .with_rpc_timeouts(Duration::from_millis(200), 1.5, Duration::from_secs(1));
    let settings = CallSettings::new(Duration::from_secs(1))
        .with_retry(RetryOptions::new([StatusCode::Unavailable], backoff));

    let callable = match ApiCallable::new(call, settings) {
        Ok(callable) => callable,
        Err(e) => {
            println!("✗ Invalid settings: {}", e);
            return;
        }
    };

    match callable.call(json!({"name": "shelves/1"}), None) {
        Ok(Outcome::Completed(resp)) => println!("✓ Success: {}", resp),
        Ok(Outcome::Bundled(_)) => println!("✗ Unexpected bundled outcome"),
        Err(e) => println!("✗ Failed: {}", e),
    }
}

fn demo_retry_exhausted() {
    println!("2. Retry deadline");
    println!("-----------------");

    let call = raw_call::<Value, Value, _>(|_req: &Value, _ctx: &CallContext| {
        Err(CallError::transport(StatusCode::Unavailable, "backend down"))
    });
    let backoff = BackoffSettings::new(Duration::from_millis(300))
        .with_delays(Duration::from_millis(50), 1.5, Duration::from_millis(200));
    let settings = CallSettings::default()
        .with_retry(RetryOptions::new([StatusCode::Unavailable], backoff));

    let Ok(callable) = ApiCallable::new(call, settings) else {
        return;
    };

    match callable.call(json!({}), None) {
        Ok(_) => println!("✗ Unexpected success"),
        Err(e) if e.is_retry_exhausted() => {
            println!("✓ Gave up: {}", e);
            println!("  Root cause: {}", e.root_cause());
        }
        Err(e) => println!("✗ Failed without retrying: {}", e),
    }
}

fn demo_bundling() {
    println!("3. Bundling");
    println!("-----------");

    let call = raw_call(|req: &Value, _ctx: &CallContext| {
        let messages = req["messages"].as_array().cloned().unwrap_or_default();
        println!(
            "  Physical call for topic {} with {} messages",
            req["topic"],
            messages.len()
        );
        let ids: Vec<Value> = (0..messages.len()).map(|i| json!(i)).collect();
        Ok(json!({"message_ids": ids}))
    });

    let descriptor = BundleDescriptor::new("messages")
        .with_discriminator("topic")
        .with_subresponse_field("message_ids");
    let thresholds = BundleThresholds::new()
        .with_element_count(4)
        .with_delay(Duration::from_millis(100));
    let settings = CallSettings::default().with_bundling(descriptor, thresholds);

    let Ok(callable) = ApiCallable::new(call, settings) else {
        return;
    };

    let requests = [
        json!({"topic": "orders", "messages": ["a", "b"]}),
        json!({"topic": "audit", "messages": ["x"]}),
        json!({"topic": "orders", "messages": ["c", "d"]}),
    ];

    let outcomes: Vec<Outcome<Value>> = requests
        .into_iter()
        .filter_map(|request| callable.call(request, None).ok())
        .collect();

    for (i, outcome) in outcomes.into_iter().enumerate() {
        match outcome.wait(Some(Duration::from_secs(1))) {
            Some(Ok(resp)) => println!("✓ Request {} got {}", i + 1, resp["message_ids"]),
            Some(Err(e)) => println!("✗ Request {} failed: {}", i + 1, e),
            None => println!("✗ Request {} not sent in time", i + 1),
        }
    }

    println!("  Drained {} remaining bundles", callable.drain());
}
