//! Dispatch benchmarks
//!
//! Run with:
//! ```bash
//! cargo bench --bench dispatch_bench
//! ```

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use serde_json::json;
use wisdom_wamp::{CallResult, Publisher, ServiceDefinition, WampController};

/// Publisher discarding every frame
struct Sink;

impl Publisher for Sink {
    fn send(&self, _channel: &str, _client_id: &str, message: String) {
        black_box(message);
    }
}

fn controller() -> WampController {
    let controller = WampController::with_base_url("http://localhost:9000/wamp", Sink);
    controller
        .register(
            ServiceDefinition::builder("Calc")
                .method("add", |a: i64, b: i64| -> CallResult<i64> { Ok(a + b) }),
            "calc",
        )
        .unwrap();
    controller
}

fn bench_call(c: &mut Criterion) {
    let controller = controller();
    controller.open("bench");
    controller.on_message("bench", r#"[1, "calc", "http://localhost:9000/wamp/calc#"]"#);

    let mut group = c.benchmark_group("call");
    group.bench_function("full_uri", |b| {
        b.iter(|| {
            controller.on_message(
                "bench",
                black_box(r#"[2, "c1", "http://localhost:9000/wamp/calc#add", 1, 2]"#),
            );
        });
    });
    group.bench_function("curie", |b| {
        b.iter(|| controller.on_message("bench", black_box(r#"[2, "c1", "calc:add", 1, 2]"#)));
    });
    group.bench_function("unknown_method", |b| {
        b.iter(|| controller.on_message("bench", black_box(r#"[2, "c1", "calc:mul", 1, 2]"#)));
    });
    group.finish();
}

fn bench_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish");
    let topic = "http://localhost:9000/wamp/ticks";

    for subscribers in [1usize, 10, 100, 1_000] {
        let controller = controller();
        for i in 0..subscribers {
            let id = format!("client-{i}");
            controller.open(&id);
            controller.handle_message(&id, json!([5, topic]));
        }
        let frame = json!([7, topic, {"n": 42}, true]).to_string();

        group.throughput(Throughput::Elements(subscribers as u64));
        group.bench_with_input(
            BenchmarkId::new("fan_out", subscribers),
            &frame,
            |b, frame| b.iter(|| controller.on_message("client-0", black_box(frame))),
        );
    }
    group.finish();
}

criterion_group!(benches, bench_call, bench_publish);
criterion_main!(benches);
