//! Benchmarks for vela-incremental.
//!
//! Target: single event reduce over a 1000 document result < 50μs

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use vela_core::{ChangeEvent, ChangeKind, Document};
use vela_incremental::{EventReduce, Window};
use vela_query::{MangoQuery, MangoStatics, Schema, SortPart, StorageStatics};

fn make_doc(id: usize, age: i64) -> Document {
    Document::new("id", json!({"id": format!("doc{:06}", id), "age": age})).unwrap()
}

fn engine(window: Window) -> EventReduce {
    let schema = Schema::new("id");
    let query = MangoQuery::new()
        .selector(json!({"age": {"$gte": 0}}))
        .sort_by(SortPart::asc("age"));
    let prepared = MangoStatics.prepare_query(&schema, &query).unwrap();
    EventReduce::new(
        window,
        MangoStatics.query_matcher(&schema, &prepared).unwrap(),
        MangoStatics.sort_comparator(&schema, &prepared).unwrap(),
    )
}

fn bench_single_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_reduce_insert");
    let reduce = engine(Window::unbounded());

    for size in [10, 100, 1000] {
        let current: Vec<Document> = (0..size).map(|i| make_doc(i, i as i64 * 2)).collect();
        let event = ChangeEvent::stamped(
            1,
            "bench",
            ChangeKind::Insert,
            None,
            Some(make_doc(size + 1, size as i64 + 1)),
        );

        group.bench_with_input(BenchmarkId::new("unbounded", size), &current, |b, current| {
            b.iter(|| reduce.reduce(black_box(current), [&event]))
        });
    }

    group.finish();
}

fn bench_batch_updates(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_reduce_batch");
    let current: Vec<Document> = (0..1000).map(|i| make_doc(i, i as i64 * 2)).collect();

    for batch in [1, 10, 100] {
        let events: Vec<ChangeEvent> = (0..batch)
            .map(|i| {
                let old = make_doc(i * 7, (i * 7) as i64 * 2);
                let new = make_doc(i * 7, (i * 7) as i64 * 2 + 1);
                ChangeEvent::stamped(i as u64 + 1, "bench", ChangeKind::Update, Some(old), Some(new))
            })
            .collect();

        for (name, window) in [("unbounded", Window::unbounded()), ("limit_50", Window::new(0, Some(50)))] {
            let reduce = engine(window);
            let window_current: Vec<Document> = current
                .iter()
                .take(window.limit.unwrap_or(usize::MAX))
                .cloned()
                .collect();
            group.bench_with_input(BenchmarkId::new(name, batch), &events, |b, events| {
                b.iter(|| reduce.reduce(black_box(&window_current), events))
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_single_insert, bench_batch_updates);
criterion_main!(benches);
