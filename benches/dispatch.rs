//! Dispatch and registration benchmarks for the messenger.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mvvm_messenger::{Action, Messenger, RegisterOptions};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

struct Base {
    value: u64,
}

struct Derived {
    base: Base,
}

struct Counter {
    hits: AtomicU64,
}

fn counter() -> Arc<Counter> {
    Arc::new(Counter {
        hits: AtomicU64::new(0),
    })
}

/// Benchmark exact-type sends with a growing number of recipients
fn bench_send_exact(c: &mut Criterion) {
    let mut group = c.benchmark_group("send_exact");

    for recipients in [1, 10, 100, 1000] {
        group.bench_with_input(
            BenchmarkId::new("recipients", recipients),
            &recipients,
            |b, &count| {
                let messenger = Messenger::new();
                let held: Vec<_> = (0..count).map(|_| counter()).collect();
                for recipient in &held {
                    messenger
                        .register(
                            recipient,
                            Action::<Base>::bound(recipient, |counter, message| {
                                counter.hits.fetch_add(message.value, Ordering::Relaxed);
                            }),
                        )
                        .unwrap();
                }

                b.iter(|| {
                    black_box(messenger.send(&Base { value: 1 }).unwrap());
                });
            },
        );
    }

    group.finish();
}

/// Benchmark derived delivery through a declared base
fn bench_send_derived(c: &mut Criterion) {
    let mut group = c.benchmark_group("send_derived");

    for recipients in [10, 100, 1000] {
        group.bench_with_input(
            BenchmarkId::new("recipients", recipients),
            &recipients,
            |b, &count| {
                let messenger = Messenger::new();
                messenger
                    .declare_base::<Derived, Base>(|derived| &derived.base)
                    .unwrap();
                let held: Vec<_> = (0..count).map(|_| counter()).collect();
                for recipient in &held {
                    messenger
                        .register_with(
                            recipient,
                            RegisterOptions::new().include_derived(),
                            Action::<Base>::bound(recipient, |counter, message| {
                                counter.hits.fetch_add(message.value, Ordering::Relaxed);
                            }),
                        )
                        .unwrap();
                }

                let message = Derived {
                    base: Base { value: 1 },
                };
                b.iter(|| {
                    black_box(messenger.send(&message).unwrap());
                });
            },
        );
    }

    group.finish();
}

/// Benchmark a tokened send among many channels
fn bench_send_token(c: &mut Criterion) {
    let messenger = Messenger::new();
    let held: Vec<_> = (0..1000u64).map(|_| counter()).collect();
    for (channel, recipient) in held.iter().enumerate() {
        messenger
            .register_with(
                recipient,
                RegisterOptions::new().token(channel as u64 % 100),
                Action::<Base>::new(|_| {}),
            )
            .unwrap();
    }

    c.bench_function("send_token_1000_over_100_channels", |b| {
        b.iter(|| {
            black_box(messenger.send_with_token(&Base { value: 1 }, 42u64).unwrap());
        });
    });
}

/// Benchmark register followed by unregister
fn bench_register_unregister(c: &mut Criterion) {
    let messenger = Messenger::new();
    let recipient = counter();

    c.bench_function("register_unregister", |b| {
        b.iter(|| {
            messenger
                .register(&recipient, Action::<Base>::new(|_| {}))
                .unwrap();
            black_box(messenger.unregister(&recipient));
        });
    });
}

criterion_group!(
    benches,
    bench_send_exact,
    bench_send_derived,
    bench_send_token,
    bench_register_unregister
);
criterion_main!(benches);
