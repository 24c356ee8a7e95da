use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, RetryConfig, RetryExecutor};
use resilience::store::InMemoryStore;
use std::sync::Arc;
use tokio::runtime::Runtime;

fn breaker() -> CircuitBreaker {
    CircuitBreaker::new(
        "openai",
        CircuitBreakerConfig {
            failure_threshold: u32::MAX,
            ..Default::default()
        },
        Arc::new(InMemoryStore::new()),
    )
}

fn benchmark_is_open_closed(c: &mut Criterion) {
    let rt = Runtime::new().expect("Failed to build runtime");
    let cb = breaker();

    c.bench_function("is_open_closed", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(cb.is_open().await.unwrap()) });
    });
}

fn benchmark_record_failure(c: &mut Criterion) {
    let rt = Runtime::new().expect("Failed to build runtime");
    let cb = breaker();

    c.bench_function("record_failure", |b| {
        b.to_async(&rt)
            .iter(|| async { cb.record_failure().await.unwrap() });
    });
}

fn benchmark_execute_success(c: &mut Criterion) {
    let rt = Runtime::new().expect("Failed to build runtime");
    let cb = breaker();
    let executor = RetryExecutor::new(RetryConfig::default());

    c.bench_function("execute_success", |b| {
        b.to_async(&rt).iter(|| async {
            executor
                .execute(&cb, || async { Ok::<_, String>(black_box(42)) })
                .await
                .unwrap()
        });
    });
}

fn benchmark_dependency_scale(c: &mut Criterion) {
    let rt = Runtime::new().expect("Failed to build runtime");
    let mut group = c.benchmark_group("dependency_scale");

    for count in [10, 100, 1000].iter() {
        let store = InMemoryStore::new();
        let breakers: Vec<CircuitBreaker> = (0..*count)
            .map(|i| {
                CircuitBreaker::new(
                    format!("dependency-{}", i),
                    CircuitBreakerConfig::default(),
                    Arc::new(store.clone()),
                )
            })
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, _| {
            b.to_async(&rt).iter(|| async {
                for cb in &breakers {
                    black_box(cb.is_open().await.unwrap());
                }
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_is_open_closed,
    benchmark_record_failure,
    benchmark_execute_success,
    benchmark_dependency_scale
);
criterion_main!(benches);
