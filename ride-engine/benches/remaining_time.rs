//! Criterion benchmarks for the remaining-time simulation and video lookups

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ride_core::{RideFrame, RouteIndex};
use ride_engine::demo::demo_route;
use ride_engine::RemainingTimeEstimator;

fn bench_full_lap(c: &mut Criterion) {
    let route = demo_route().unwrap();
    let rider = RideFrame::default();

    let mut group = c.benchmark_group("remaining_time");
    for power in [120.0, 200.0, 300.0] {
        group.bench_with_input(BenchmarkId::new("full_lap", power as u32), &power, |b, &power| {
            b.iter(|| {
                // fresh estimator so every iteration simulates
                let mut estimator = RemainingTimeEstimator::default();
                black_box(estimator.remaining_time(
                    &rider,
                    &route,
                    black_box(0.0),
                    Some(power),
                    None,
                    None,
                ))
            })
        });
    }
    group.finish();
}

fn bench_video_lookup(c: &mut Criterion) {
    let route = demo_route().unwrap();
    let index = RouteIndex::new(&route);

    c.bench_function("video_time_by_position", |b| {
        let mut position = 0.0;
        b.iter(|| {
            position = (position + 37.0) % route.total_distance();
            black_box(index.video_time_by_position(black_box(position)))
        })
    });
}

criterion_group!(benches, bench_full_lap, bench_video_lookup);
criterion_main!(benches);
