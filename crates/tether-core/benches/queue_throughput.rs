use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use std::thread;
use tether_core::{Queue, QueueLimit, QueueOptions, Registry, RegistryOptions, Strategy, Timeout};

fn bench_single_thread(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_single_thread");
    group.throughput(Throughput::Elements(1_000));

    for limit in [QueueLimit::Unbounded, QueueLimit::Bounded(1_024)] {
        group.bench_with_input(
            BenchmarkId::new("add_pop", limit.as_raw()),
            &limit,
            |b, &limit| {
                let queue = Queue::new(QueueOptions::with_limit(limit)).unwrap();
                b.iter(|| {
                    for i in 0..1_000u64 {
                        queue.add(black_box(i), Timeout::Immediate).unwrap();
                    }
                    for _ in 0..1_000 {
                        black_box(queue.pop(Timeout::Immediate).unwrap());
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_producer_consumer(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_spsc");
    group.throughput(Throughput::Elements(10_000));

    group.bench_function("bounded_64", |b| {
        b.iter(|| {
            let queue = Arc::new(Queue::new(QueueOptions::with_limit(QueueLimit::Bounded(64))).unwrap());
            let consumer = {
                let queue = queue.clone();
                thread::spawn(move || {
                    let mut sum = 0u64;
                    for _ in 0..10_000 {
                        sum += queue.pop(Timeout::Forever).unwrap();
                    }
                    sum
                })
            };
            for i in 0..10_000u64 {
                queue.add(i, Timeout::Forever).unwrap();
            }
            black_box(consumer.join().unwrap());
        });
    });

    group.finish();
}

fn bench_registry_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry_lookup");

    for strategy in [Strategy::Locked, Strategy::Atomic] {
        let registry = Registry::with_options(RegistryOptions {
            strategy,
            ..Default::default()
        });
        let queue = Queue::<u8>::create(&registry, QueueOptions::default()).unwrap();
        let handle = queue.handle();

        group.bench_function(BenchmarkId::new("get", format!("{:?}", strategy)), |b| {
            b.iter(|| black_box(registry.get::<Queue<u8>>(black_box(handle)).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_single_thread,
    bench_producer_consumer,
    bench_registry_lookup
);
criterion_main!(benches);
