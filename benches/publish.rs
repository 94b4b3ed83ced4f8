//! Performance benchmarks for a3s-event-store
//!
//! Run with: cargo bench

use a3s_event_store::{EventId, EventPayload, EventRecord, EventStore, EventStoreConfig, MemoryTable};
use criterion::{criterion_group, criterion_main, Criterion};
use std::sync::Arc;

fn sample_payload() -> EventPayload {
    serde_json::json!({"type": "MESSAGE_ADDED", "text": "hi", "subscriptionId": "sub-1"})
        .as_object()
        .cloned()
        .unwrap_or_default()
}

fn bench_id_generation(c: &mut Criterion) {
    c.bench_function("EventId::generate", |b| {
        b.iter(EventId::generate);
    });

    c.bench_function("EventId to_string", |b| {
        let id = EventId::generate();
        b.iter(|| id.to_string());
    });
}

fn bench_record(c: &mut Criterion) {
    let payload = sample_payload();

    c.bench_function("EventRecord::build", |b| {
        b.iter(|| EventRecord::build(EventId::generate(), 1_700_000_100, payload.clone()).unwrap());
    });

    let record = EventRecord::build(EventId::generate(), 1_700_000_100, payload).unwrap();
    c.bench_function("EventRecord serialize", |b| {
        b.iter(|| serde_json::to_vec(&record).unwrap());
    });

    let bytes = serde_json::to_vec(&record).unwrap();
    c.bench_function("EventRecord deserialize", |b| {
        b.iter(|| serde_json::from_slice::<EventRecord>(&bytes).unwrap());
    });
}

fn bench_memory_publish(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = EventStore::new(Arc::new(MemoryTable::default()), EventStoreConfig::default())
        .unwrap();
    let payload = sample_payload();

    c.bench_function("MemoryTable publish", |b| {
        b.to_async(&rt).iter(|| store.publish(payload.clone()));
    });
}

criterion_group!(benches, bench_id_generation, bench_record, bench_memory_publish);
criterion_main!(benches);
