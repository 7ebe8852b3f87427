use std::num::NonZeroU32;
use std::sync::Barrier;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use criterion::BenchmarkId;
use criterion::Criterion;
use criterion::black_box;
use criterion::criterion_group;
use criterion::criterion_main;

use governor::Quota;
use governor::RateLimiter;

use tbucket::Bucket;

fn bench_try_acquire(c: &mut Criterion, name: &str, try_acquire: impl Fn() -> bool + Sync) {
    let mut group = c.benchmark_group(name);

    group.bench_function("single-threaded", |b| b.iter(|| black_box(try_acquire())));

    for threads in [2, 4, 8] {
        group.bench_with_input(BenchmarkId::new("threads", threads), &threads, |b, &n| {
            b.iter_custom(|iters| {
                let barrier = Barrier::new(n + 1);
                thread::scope(|s| {
                    for _ in 0..n {
                        s.spawn(|| {
                            barrier.wait();
                            for _ in 0..iters / n as u64 {
                                black_box(try_acquire());
                            }
                        });
                    }
                    barrier.wait();
                    let start = Instant::now();
                    // Scope end joins the workers before elapsed is read
                    start
                })
                .elapsed()
            });
        });
    }

    group.finish();
}

fn run_all_benches(c: &mut Criterion) {
    let limit = 1_000_000;
    let period = Duration::from_secs(60);

    // The refill task needs a runtime to live on.
    let rt = tokio::runtime::Runtime::new().unwrap();
    let _guard = rt.enter();

    let bucket = Bucket::new(limit, period / limit as u32).unwrap();
    bench_try_acquire(c, "Bucket", || bucket.try_get().is_ok());

    let governor = RateLimiter::direct(Quota::per_minute(
        NonZeroU32::new(limit as u32).unwrap(),
    ));
    bench_try_acquire(c, "Governor", || governor.check().is_ok());

    rt.block_on(bucket.close());
}

criterion_group!(benches, run_all_benches);
criterion_main!(benches);
