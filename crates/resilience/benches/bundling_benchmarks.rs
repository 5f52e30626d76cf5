//! Benchmarks for the bundling executor
//!
//! Run with: cargo bench --package callwright-resilience

use callwright_resilience::{
    BackoffSettings, BundleDescriptor, BundleThresholds, Call, Executor, FieldPath, Message,
};
use criterion::{criterion_group, criterion_main, Criterion};
use serde_json::{json, Value};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

fn count_call() -> Call<Value, Value> {
    Arc::new(|req: &Value| {
        let n = req["messages"].as_array().map_or(0, Vec::len);
        Ok(json!({"count": n}))
    })
}

fn descriptor() -> BundleDescriptor {
    BundleDescriptor::new("messages").with_discriminator("topic")
}

fn bench_schedule_single_key(c: &mut Criterion) {
    let executor = Executor::new(BundleThresholds::new().with_element_count(100))
        .expect("Failed to create executor");
    let descriptor = descriptor();
    let call = count_call();
    let request = json!({"topic": "t", "messages": ["payload"]});
    let key = descriptor.bundle_key(&request);

    c.bench_function("executor_schedule_single_key", |b| {
        b.iter(|| {
            let future = executor.schedule(call.clone(), key.clone(), &descriptor, request.clone());
            black_box(future);
        });
    });
    executor.drain();
}

fn bench_schedule_many_keys(c: &mut Criterion) {
    let executor = Executor::new(BundleThresholds::new().with_element_count(10))
        .expect("Failed to create executor");
    let descriptor = descriptor();
    let call = count_call();
    let requests: Vec<Value> = (0..64)
        .map(|i| json!({"topic": format!("topic-{i}"), "messages": ["payload"]}))
        .collect();

    c.bench_function("executor_schedule_64_keys", |b| {
        b.iter(|| {
            for request in &requests {
                let key = descriptor.bundle_key(request);
                black_box(executor.schedule(call.clone(), key, &descriptor, request.clone()));
            }
        });
    });
    executor.drain();
}

fn bench_bundle_key(c: &mut Criterion) {
    let descriptor = descriptor().with_discriminator("options.region");
    let request = json!({"topic": "t", "options": {"region": "eu"}, "messages": ["a", "b"]});

    c.bench_function("bundle_key", |b| {
        b.iter(|| black_box(descriptor.bundle_key(black_box(&request))));
    });
}

fn bench_element_extraction(c: &mut Criterion) {
    let field = FieldPath::new("messages");
    let request = json!({"messages": (0..100).map(|i| format!("m{i}")).collect::<Vec<_>>()});

    c.bench_function("elements_100", |b| {
        b.iter(|| black_box(request.elements(&field)));
    });
}

fn bench_backoff_delays(c: &mut Criterion) {
    let settings = BackoffSettings::default().with_delays(
        Duration::from_millis(100),
        1.3,
        Duration::from_secs(60),
    );

    c.bench_function("backoff_delays_32", |b| {
        b.iter(|| black_box(settings.delays().take(32).last()));
    });
}

criterion_group!(
    benches,
    bench_schedule_single_key,
    bench_schedule_many_keys,
    bench_bundle_key,
    bench_element_extraction,
    bench_backoff_delays
);

criterion_main!(benches);
