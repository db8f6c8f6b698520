// Benchmark for spool throughput and interpreter drain speed
// Run with: cargo bench

use criterion::{Criterion, criterion_group, criterion_main};
use krusty_laser::context::HostContext;
use krusty_laser::{Command, Interpreter, Job, NullBackend, Spooler, Tick};
use std::sync::Arc;

fn bench_spool_enqueue_pop(c: &mut Criterion) {
    let context = Arc::new(HostContext::default());
    let spooler = Spooler::new(context);
    c.bench_function("enqueue and pop 10k jobs", |b| {
        b.iter(|| {
            for i in 0..10_000u16 {
                spooler.enqueue(Job::code(i));
            }
            let mut count = 0;
            while spooler.pop().is_some() {
                count += 1;
            }
            assert_eq!(count, 10_000);
        });
    });
}

fn bench_interpreter_drain(c: &mut Criterion) {
    let context = Arc::new(HostContext::default());
    let spooler = Arc::new(Spooler::new(context.clone()));
    let interpreter = Interpreter::new(NullBackend, spooler.clone(), context);
    c.bench_function("drain 10k-command lazy job", |b| {
        b.iter(|| {
            spooler.enqueue(Job::lazy(|| {
                (0..10_000).map(|i| {
                    if i % 2 == 0 {
                        Command::Move { x: i, y: i }
                    } else {
                        Command::Cut { x: i, y: 0 }
                    }
                })
            }));
            let mut ticks = 0;
            while interpreter.tick() != Tick::Idle {
                ticks += 1;
            }
            assert_eq!(ticks, 10_001);
        });
    });
}

criterion_group!(benches, bench_spool_enqueue_pop, bench_interpreter_drain);
criterion_main!(benches);
