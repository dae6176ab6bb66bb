//! # Division Mesh Benchmarks
//!
//! | Area | Operation |
//! |------|-----------|
//! | shared-bus | pattern match over nested payloads |
//! | dm-02 queue | enqueue + leased dequeue + acknowledge |
//! | dm-02 router | route same-division and trusted cross-division messages |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dm_01_federation::{FederationApi, FederationAuthorizer, InMemoryPermissionsStore};
use dm_02_message_router::{
    InMemoryMessageQueue, MessageQueue, MessageRouterApi, MessageRouterService, QueueConfig,
};
use rand::Rng;
use serde_json::json;
use shared_bus::FilterPattern;
use shared_types::{AgentMessage, MessageType, SystemTimeSource, TimeSource};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

fn message(source: &str, target: &str, priority: u8) -> AgentMessage {
    AgentMessage::builder("agent-a", source, "agent-x", target, MessageType::Request)
        .priority(priority)
        .payload(json!({"task": "summarize", "size": priority}))
        .build(SystemTimeSource.now())
        .unwrap()
}

fn bench_pattern_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("shared-bus-pattern");

    let pattern = FilterPattern::any()
        .exists("targetDivisionId")
        .one_of("messageType", ["request", "event"])
        .nested("payload", FilterPattern::any().equals("task", "summarize"));
    let hit = json!({
        "targetDivisionId": "division-b",
        "messageType": "request",
        "payload": {"task": "summarize", "size": 3}
    });
    let miss = json!({"messageType": "heartbeat"});

    group.bench_function("match_hit", |b| b.iter(|| black_box(pattern.matches(&hit))));
    group.bench_function("match_miss", |b| b.iter(|| black_box(pattern.matches(&miss))));
    group.finish();
}

fn bench_queue(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("dm-02-queue");

    for backlog in [10usize, 100, 1000] {
        let queue = InMemoryMessageQueue::new(QueueConfig::default());
        rt.block_on(async {
            let mut rng = rand::thread_rng();
            for _ in 0..backlog {
                let priority = rng.gen_range(1..=10);
                queue
                    .enqueue("division-b", message("division-a", "division-b", priority), Duration::ZERO)
                    .await
                    .unwrap();
            }
        });

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("cycle", backlog), &queue, |b, queue| {
            b.to_async(&rt).iter(|| async move {
                queue
                    .enqueue("division-b", message("division-a", "division-b", 5), Duration::ZERO)
                    .await
                    .unwrap();
                let leased = queue
                    .dequeue("division-b", Duration::ZERO)
                    .await
                    .unwrap()
                    .unwrap();
                queue.acknowledge(&leased.lease).await.unwrap();
            })
        });
    }
    group.finish();
}

fn bench_routing(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("dm-02-router");
    group.measurement_time(Duration::from_secs(5));

    let federation = Arc::new(FederationAuthorizer::new(Arc::new(InMemoryPermissionsStore::new())));
    federation
        .register_trusted_division("division-a", "division-b", "local://division-b", vec!["request".into()])
        .unwrap();
    let router = MessageRouterService::builder(federation).build().unwrap();
    let router = &router;

    group.bench_function("route_same_division", |b| {
        b.to_async(&rt)
            .iter(|| async move {
                black_box(router.route(message("division-b", "division-b", 5)).await.unwrap())
            })
    });
    group.bench_function("route_cross_division", |b| {
        b.to_async(&rt)
            .iter(|| async move {
                black_box(router.route(message("division-a", "division-b", 5)).await.unwrap())
            })
    });
    group.finish();
}

criterion_group!(benches, bench_pattern_matching, bench_queue, bench_routing);
criterion_main!(benches);
