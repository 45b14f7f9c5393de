use criterion::{Criterion, criterion_group, criterion_main};
use event_bus::{BusConfig, EventBus, InMemoryEventBus, OutboundMessage, Subscription};
use tokio::time::Duration;

fn message(key: &str) -> OutboundMessage {
    OutboundMessage::builder()
        .topic("order-created")
        .key(key)
        .event_type("OrderCreated")
        .payload_json(serde_json::json!({ "orderNumber": key, "items": [] }))
        .build()
        .unwrap()
}

fn bench_publish(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let bus = InMemoryEventBus::new(BusConfig::default());
    let mut i = 0u64;

    c.bench_function("bus/publish", |b| {
        b.iter(|| {
            i += 1;
            rt.block_on(bus.publish(message(&format!("ORD-{i}"))))
                .unwrap();
        });
    });
}

fn bench_publish_poll_ack(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let bus = InMemoryEventBus::new(BusConfig {
        partitions: 1,
        ..BusConfig::default()
    });
    let sub = Subscription::new("bench-group", "bench-1", ["order-created"]);
    rt.block_on(bus.join(&sub)).unwrap();

    c.bench_function("bus/publish_poll_ack", |b| {
        b.iter(|| {
            rt.block_on(async {
                bus.publish(message("ORD-BENCH")).await.unwrap();
                let batch = bus.poll(&sub, 1, Duration::ZERO).await.unwrap();
                bus.ack(&batch[0]).await.unwrap();
            });
        });
    });
}

criterion_group!(benches, bench_publish, bench_publish_poll_ack);
criterion_main!(benches);
