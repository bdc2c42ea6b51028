//! Benchmarks for publish delivery and bubbling.
//!
//! Run with: cargo bench -p bindkit-core --bench publish_bench

use std::cell::Cell;
use std::hint::black_box;
use std::rc::Rc;

use bindkit_core::{Bindings, Dispatcher, Property, SubscribeOptions};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

/// Build a parent chain of `depth` objects, each with one counting subscriber.
fn make_chain(d: &Dispatcher, depth: usize, hits: &Rc<Cell<u64>>) -> Vec<Bindings> {
    let chain: Vec<Bindings> = (0..depth).map(|_| Bindings::in_dispatcher(d)).collect();
    for pair in chain.windows(2) {
        pair[0]
            .set_parent(Some(&pair[1].all_members()))
            .expect("fresh chain has no cycles");
    }
    for tier in &chain {
        let hits = Rc::clone(hits);
        tier.all_members()
            .subscribe(move |_| hits.set(hits.get() + 1));
    }
    chain
}

fn bench_publish_direct(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish/direct");

    for subscribers in [1usize, 8, 64] {
        group.throughput(Throughput::Elements(subscribers as u64));
        let d = Dispatcher::new();
        let b = Bindings::in_dispatcher(&d);
        let x = Property::new(&b, "x", 0u64);
        let hits = Rc::new(Cell::new(0u64));
        for _ in 0..subscribers {
            let hits = Rc::clone(&hits);
            x.subscribe(SubscribeOptions::new(), move |_| hits.set(hits.get() + 1))
                .expect("declared member");
        }
        group.bench_with_input(
            BenchmarkId::new("set", subscribers),
            &subscribers,
            |bench, _| {
                let mut v = 0u64;
                bench.iter(|| {
                    v += 1;
                    x.set(black_box(v));
                });
            },
        );
    }

    group.finish();
}

fn bench_publish_bubble(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish/bubble");

    for depth in [2usize, 8, 15] {
        group.throughput(Throughput::Elements(depth as u64));
        let d = Dispatcher::new();
        let hits = Rc::new(Cell::new(0u64));
        let chain = make_chain(&d, depth, &hits);
        let leaf = chain[0].all_members();
        group.bench_with_input(BenchmarkId::new("chain", depth), &depth, |bench, _| {
            bench.iter(|| leaf.publish(black_box(1u32), black_box(2u32)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_publish_direct, bench_publish_bubble);
criterion_main!(benches);
