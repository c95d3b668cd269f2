//! Benchmarks for the async validation coordinator and the sync validators.
//!
//! Run with: cargo bench -p claimform-validation --bench coordinator_bench

use std::hint::black_box;
use std::time::Duration;

use claimform_validation::{
    AsyncValidationCoordinator, CheckOutcome, CoordinatorConfig, Email, Range, Validator,
};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use web_time::Instant;

const DEBOUNCE: Duration = Duration::from_millis(500);

fn emails(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("user{i}@example.com")).collect()
}

/// One key typed into `edits` times inside a single debounce window.
fn bench_debounced_burst(c: &mut Criterion) {
    let mut group = c.benchmark_group("coordinator/burst");
    for edits in [8usize, 64, 512] {
        let values = emails(edits);
        group.throughput(Throughput::Elements(edits as u64));
        group.bench_with_input(BenchmarkId::from_parameter(edits), &values, |b, values| {
            b.iter(|| {
                let t0 = Instant::now();
                let config = CoordinatorConfig::default().with_trace(false);
                let mut coordinator = AsyncValidationCoordinator::new_at(config, t0);
                for (i, value) in values.iter().enumerate() {
                    coordinator.request_at(0u32, value, t0 + Duration::from_millis(i as u64));
                }
                let due = t0 + Duration::from_millis(values.len() as u64) + DEBOUNCE;
                black_box(coordinator.poll_due(due))
            });
        });
    }
    group.finish();
}

/// Many keys settling through remote answers, then again through the cache.
fn bench_many_keys(c: &mut Criterion) {
    let mut group = c.benchmark_group("coordinator/keys");
    for keys in [5usize, 50, 500] {
        let values = emails(keys);
        group.throughput(Throughput::Elements(keys as u64));
        group.bench_with_input(BenchmarkId::from_parameter(keys), &values, |b, values| {
            b.iter(|| {
                let t0 = Instant::now();
                let mut coordinator =
                    AsyncValidationCoordinator::new_at(CoordinatorConfig::default(), t0);
                for (key, value) in values.iter().enumerate() {
                    coordinator.request_at(key, value, t0);
                }
                for ticket in coordinator.poll_due(t0 + DEBOUNCE) {
                    coordinator.complete_at(&ticket, CheckOutcome::Passed, t0 + DEBOUNCE);
                }
                // Rotate values across keys so requests settle from the cache.
                for (key, value) in values.iter().rev().enumerate() {
                    coordinator.request_at(key, value, t0 + DEBOUNCE * 2);
                }
                black_box(coordinator.stats())
            });
        });
    }
    group.finish();
}

fn bench_validators(c: &mut Criterion) {
    let email = Email::new();
    let range = Range::new(0.0_f64, 300.0);
    let values = emails(64);

    c.bench_function("validators/email", |b| {
        b.iter(|| {
            for value in &values {
                black_box(email.validate(black_box(value.as_str())));
            }
        });
    });
    c.bench_function("validators/range", |b| {
        b.iter(|| {
            for i in 0..64 {
                black_box(range.validate(&black_box(f64::from(i) * 5.0)));
            }
        });
    });
}

criterion_group!(benches, bench_debounced_burst, bench_many_keys, bench_validators);
criterion_main!(benches);
