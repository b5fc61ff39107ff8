//! Benchmark: memo hits, lazy invalidation and eager propagation

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use reckon_core::{Listener, Memo, Runtime, Signal};

/// A linear chain of `depth` memos over one signal.
fn chain(runtime: &Runtime, depth: usize) -> (Signal<u64>, Memo<(), u64>) {
    let source = Signal::new(runtime, 0u64);
    let first = {
        let source = source.clone();
        Memo::new(runtime, move |_: &()| source.get() + 1)
    };
    let last = (1..depth).fold(first, |previous, _| {
        Memo::try_new(runtime, move |_: &()| Ok(previous.get()? + 1))
    });
    (source, last)
}

fn benchmark_cache_hit(c: &mut Criterion) {
    let runtime = Runtime::new();
    let square = Memo::keyed(&runtime, |x: &u64| x * x, |x| x.to_string());
    square.call(12).unwrap();

    c.bench_function("cache_hit", |b| {
        b.iter(|| square.call(black_box(12)).unwrap())
    });
}

fn benchmark_lazy_invalidation(c: &mut Criterion) {
    let mut group = c.benchmark_group("lazy_invalidation");
    for depth in [4usize, 32, 128] {
        let runtime = Runtime::new();
        let (source, last) = chain(&runtime, depth);
        last.get().unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.iter(|| {
                source.update(|v| v + 1).unwrap();
                black_box(last.get().unwrap())
            })
        });
    }
    group.finish();
}

fn benchmark_eager_propagation(c: &mut Criterion) {
    let mut group = c.benchmark_group("eager_propagation");
    for depth in [4usize, 32, 128] {
        let runtime = Runtime::new();
        let (source, last) = chain(&runtime, depth);
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        let listener = Listener::new(&runtime, move || {
            fired_clone.fetch_add(1, Ordering::Relaxed);
        });
        runtime.autosubscribe(&listener, || last.get()).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.iter(|| source.update(|v| v + 1).unwrap())
        });
    }
    group.finish();
}

fn benchmark_fan_out(c: &mut Criterion) {
    let runtime = Runtime::new();
    let source = Signal::new(&runtime, 0u64);
    let scaled = {
        let source = source.clone();
        Memo::keyed(&runtime, move |x: &u64| source.get() * x, |x| x.to_string())
    };
    let listener = Listener::new(&runtime, || {});
    runtime.autosubscribe(&listener, || {
        for x in 0..256u64 {
            scaled.call(x).unwrap();
        }
    });

    c.bench_function("fan_out_256_keys", |b| {
        b.iter(|| source.update(|v| v + 1).unwrap())
    });
}

criterion_group!(
    benches,
    benchmark_cache_hit,
    benchmark_lazy_invalidation,
    benchmark_eager_propagation,
    benchmark_fan_out
);
criterion_main!(benches);
