use std::hint::black_box;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::Barrier;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use criterion::BenchmarkId;
use criterion::Criterion;
use criterion::criterion_group;
use criterion::criterion_main;

use governor::Quota;

use surge_limit::LimiterConfig;
use surge_limit::RateLimiter;

// A budget large enough that the benches measure the hot path, not refusal.
const BENCH_TOKENS: i64 = 1_000_000_000;

fn engine(sliding: bool) -> Arc<RateLimiter> {
    let limiter = RateLimiter::new();
    let mut config = LimiterConfig::new(BENCH_TOKENS, Duration::from_secs(1));
    if sliding {
        config = config.sliding_window();
    }
    limiter.create_limiter("bench", config).unwrap();
    Arc::new(limiter)
}

fn bench_single_threaded(c: &mut Criterion) {
    let mut group = c.benchmark_group("single-threaded");

    let fixed = engine(false);
    group.bench_function("surge-fixed", |b| {
        b.iter(|| black_box(fixed.try_request("bench")))
    });

    let sliding = engine(true);
    group.bench_function("surge-sliding", |b| {
        b.iter(|| black_box(sliding.try_request("bench")))
    });

    // Reference point: governor's keyed limiter on the same key.
    let quota = Quota::per_second(NonZeroU32::new(u32::MAX).unwrap());
    let gov = governor::RateLimiter::keyed(quota);
    group.bench_function("governor-keyed", |b| {
        b.iter(|| black_box(gov.check_key(&"bench").is_ok()))
    });

    group.finish();
}

fn bench_parallel(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel");

    for threads in [2, 4, 8] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{threads}-threads")),
            &threads,
            |b, &n| {
                b.iter_custom(|iters| {
                    let limiter = engine(false);
                    let barrier = Arc::new(Barrier::new(n + 1));
                    let mut handles = Vec::with_capacity(n);

                    for _ in 0..n {
                        let limiter = Arc::clone(&limiter);
                        let barrier = Arc::clone(&barrier);
                        let iters_per_thread = iters / n as u64;

                        handles.push(thread::spawn(move || {
                            barrier.wait();
                            for _ in 0..iters_per_thread {
                                black_box(limiter.try_request("bench"));
                            }
                        }));
                    }

                    barrier.wait();
                    let start = Instant::now();
                    for handle in handles {
                        let _ = handle.join();
                    }
                    start.elapsed()
                });
            },
        );
    }

    group.finish();
}

fn bench_lookup_miss(c: &mut Criterion) {
    let limiter = engine(false);

    // Refusals on unknown keys are the cheapest path; keep them cheap.
    c.bench_function("unknown-key", |b| {
        b.iter(|| black_box(limiter.try_request("no-such-key")))
    });
}

criterion_group!(
    benches,
    bench_single_threaded,
    bench_parallel,
    bench_lookup_miss
);
criterion_main!(benches);
