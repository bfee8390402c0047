//! Hot-path benchmarks: forward-difference setup and advance, the
//! distance-integral inversion, and a full move through the pipeline.
//!
//! The forward-difference path is what runs in the execution interrupt
//! analogue once per segment; its budget is a handful of additions.

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

use gantry_motion::fdiff::ForwardDiffs;
use gantry_motion::hal::sim::SimHal;
use gantry_motion::quintic::QuinticVelocity;
use gantry_motion::{AlineRequest, MotionCore};

fn bench_forward_diff_init(c: &mut Criterion) {
    c.bench_function("fdiff_init", |b| {
        b.iter(|| {
            let (fd, v) = ForwardDiffs::init(
                std::hint::black_box(10.0),
                std::hint::black_box(250.0),
                0.0,
                0.0,
                0.0,
                0.0,
                0.08,
                16.0,
            );
            (fd, v)
        })
    });
}

fn bench_forward_diff_section(c: &mut Criterion) {
    c.bench_function("fdiff_32_segments", |b| {
        b.iter(|| {
            let (mut fd, mut v) =
                ForwardDiffs::init(0.0, 200.0, 0.0, 0.0, 0.0, 0.0, 0.1, 32.0);
            let mut sum = 0.0;
            for _ in 0..32 {
                sum += v;
                v += fd.f5;
                fd.advance();
            }
            std::hint::black_box(sum)
        })
    });
}

fn bench_time_at_distance(c: &mut Criterion) {
    let curve = QuinticVelocity::from_boundary(20.0, 180.0, 0.0, 0.0, 0.0, 0.0, 0.12);
    let half = curve.total_distance() * 0.5;
    c.bench_function("quintic_time_at_distance", |b| {
        b.iter(|| curve.time_at_distance(std::hint::black_box(half)))
    });
}

fn bench_full_move(c: &mut Criterion) {
    c.bench_function("full_10mm_move", |b| {
        b.iter_batched(
            || {
                let mut core = MotionCore::new();
                core.queue
                    .enqueue_aline(&AlineRequest {
                        target: [10.0, 0.0, 0.0, 0.0],
                        cruise_vmax: 100.0,
                        exit_velocity: 0.0,
                        exit_vmax: 0.0,
                        jerk: 1e6,
                    })
                    .unwrap();
                (core, SimHal::new(80.0))
            },
            |(mut core, mut hal)| {
                for _ in 0..200 {
                    let outcome = core.exec_move(&mut hal).unwrap();
                    if hal.take_plan_request() {
                        while core.plan_move(&mut hal).unwrap()
                            != gantry_common::ExecOutcome::Noop
                        {}
                    }
                    if outcome == gantry_common::ExecOutcome::Noop && core.queue.is_empty() {
                        break;
                    }
                }
                core
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(
    benches,
    bench_forward_diff_init,
    bench_forward_diff_section,
    bench_time_at_distance,
    bench_full_move
);
criterion_main!(benches);
