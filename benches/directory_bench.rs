//! Benchmarks for the session directory and dispatch path
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use serde_json::{json, Value};
use std::sync::Arc;
use switchyard::event::{reorder_reply, Event, Fields};
use switchyard::hub::{Hub, HubConfig};
use switchyard::session::{generate_instance_id, Frame, SessionDirectory, Socket, INSTANCE_ID};
use switchyard::store::MemoryStore;
use switchyard::trigger::Tier;
use tokio::sync::mpsc;

/// Directory with `count` instanced sessions of one socket each
fn populated(count: usize) -> (SessionDirectory, Vec<Socket>, Vec<String>) {
    let mut directory = SessionDirectory::new();
    let mut sockets = Vec::with_capacity(count);
    let mut instances = Vec::with_capacity(count);

    for _ in 0..count {
        let (tx, _rx) = mpsc::unbounded_channel::<Frame>();
        let socket = Socket::new(tx);
        directory.add_session(socket.clone());

        let instance = generate_instance_id();
        let mut data = Fields::new();
        data.insert(INSTANCE_ID.to_string(), Value::String(instance.clone()));
        directory.set_session_data(socket.id(), data);

        sockets.push(socket);
        instances.push(instance);
    }
    (directory, sockets, instances)
}

fn bench_directory(c: &mut Criterion) {
    let mut group = c.benchmark_group("directory");

    for size in [100, 1000] {
        group.throughput(Throughput::Elements(1));

        group.bench_function(format!("lookup_by_instance_{}", size), |b| {
            let (directory, _sockets, instances) = populated(size);
            let last = instances[size - 1].clone();
            b.iter(|| directory.get_session_by_instance(black_box(&last)))
        });

        group.bench_function(format!("set_session_data_{}", size), |b| {
            let (mut directory, sockets, instances) = populated(size);
            let socket = sockets[size / 2].clone();
            let mut data = Fields::new();
            data.insert(
                INSTANCE_ID.to_string(),
                Value::String(instances[size / 2].clone()),
            );
            data.insert("_username".to_string(), json!("bench"));
            b.iter(|| directory.set_session_data(socket.id(), black_box(data.clone())))
        });

        group.bench_function(format!("combine_sessions_{}", size), |b| {
            b.iter_batched(
                || {
                    let (mut directory, _sockets, instances) = populated(size);
                    let (tx, _rx) = mpsc::unbounded_channel::<Frame>();
                    let newcomer = Socket::new(tx);
                    directory.add_session(newcomer.clone());
                    (directory, newcomer, instances[0].clone())
                },
                |(mut directory, newcomer, target)| {
                    directory.combine_sessions(&target, newcomer.id())
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");
    let runtime = tokio::runtime::Runtime::new().unwrap();

    let hub = Hub::new(HubConfig::default(), Arc::new(MemoryStore::new()));
    runtime.block_on(hub.on(Tier::Api, "ping", |mut event: Event, _ctx| async move {
        event.set_info("pong");
        Ok(event)
    }));

    let (tx, _rx) = mpsc::unbounded_channel::<Frame>();
    let socket = Socket::new(tx);
    runtime.block_on(hub.connect(&socket)).unwrap();

    group.bench_function("trigger_ping", |b| {
        b.iter(|| runtime.block_on(hub.trigger(black_box(Event::new("ping")))))
    });

    group.bench_function("process_message_ping", |b| {
        b.iter(|| {
            runtime.block_on(
                hub.process_message(&socket, black_box(json!({"type": "ping", "_id": 1}))),
            )
        })
    });

    group.bench_function("reorder_reply", |b| {
        let reply = Event::new("ping")
            .with("e", "oops")
            .with("payload", json!({"a": [1, 2, 3]}))
            .with("i", "info")
            .with("_id", 7)
            .with("to", "all");
        b.iter(|| reorder_reply(black_box(reply.clone())))
    });

    group.finish();
}

criterion_group!(benches, bench_directory, bench_dispatch);
criterion_main!(benches);
