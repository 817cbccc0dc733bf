//! Benchmarks for the Sketchroom event bus and stroke relay
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use sketchroom::bus::{BusConfig, BusEvent, EventBus};
use sketchroom::config::CanvasConfig;
use sketchroom::relay::{Point, RelayConfig, SegmentMode, StrokeRelay};
use sketchroom::session::ClientId;
use sketchroom::websocket::ServerMessage;
use std::sync::Arc;

fn subscribed_bus(subscribers: u64) -> (Arc<EventBus>, Vec<sketchroom::bus::Subscription>) {
    let bus = Arc::new(EventBus::new(BusConfig::default()));
    let subs = (0..subscribers)
        .map(|i| bus.subscribe(ClientId::new(i)))
        .collect();
    (bus, subs)
}

fn bench_publish_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("bus_publish");

    for subscribers in [1u64, 16, 128] {
        let (bus, _subs) = subscribed_bus(subscribers);

        group.throughput(Throughput::Elements(subscribers));

        // Queues saturate at the droppable bound, so steady state includes eviction
        group.bench_function(format!("droppable_to_{}", subscribers), |b| {
            b.iter(|| {
                bus.publish(
                    black_box(BusEvent::droppable(ServerMessage::Pong)),
                    Some(ClientId::new(0)),
                )
            })
        });
    }

    group.finish();
}

fn bench_relay_segments(c: &mut Criterion) {
    let mut group = c.benchmark_group("relay");

    let (bus, _subs) = subscribed_bus(16);
    let relay = StrokeRelay::new(
        Arc::clone(&bus),
        RelayConfig {
            canvas: CanvasConfig::default(),
            broadcast_clear: true,
        },
    );
    let owner = ClientId::new(0);
    let segment: Vec<Point> = (0..8).map(|i| Point::new(i as f64, i as f64 * 2.0)).collect();

    group.throughput(Throughput::Elements(segment.len() as u64));

    let mut stroke = 0u64;
    group.bench_function("append_8_points", |b| {
        b.iter(|| {
            stroke += 1;
            // fresh stroke every 1k segments keeps point logs bounded
            let id = format!("bench-{}", stroke / 1000);
            relay
                .on_segment(owner, id, black_box(segment.clone()), SegmentMode::Append)
                .ok()
        })
    });

    group.finish();
}

criterion_group!(benches, bench_publish_fanout, bench_relay_segments);
criterion_main!(benches);
