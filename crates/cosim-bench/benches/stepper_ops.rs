//! Criterion micro-benchmarks for model stepping and input buffering.

use std::hint::black_box;

use cosim_bench::reference_stepper;
use cosim_core::VarId;
use cosim_engine::{InputMailbox, ModelStepper};
use cosim_models::{Integrator, Pid, PidGains, PidState};
use criterion::{criterion_group, criterion_main, Criterion};
use indexmap::IndexMap;

/// Benchmark: one 0.1 s advance of the mass-spring-damper (10 RK4 substeps).
fn bench_msd_advance(c: &mut Criterion) {
    let mut stepper = reference_stepper();
    let u = stepper.registry().input("u").unwrap();

    c.bench_function("msd_advance_0_1s", |b| {
        b.iter(|| {
            stepper.stage(u, black_box(1.0)).unwrap();
            stepper.advance(0.1).unwrap();
        });
    });
}

/// Benchmark: integrator advance, the minimum per-step overhead.
fn bench_integrator_advance(c: &mut Criterion) {
    let mut stepper =
        ModelStepper::new(Box::new(Integrator::new()), 0.0, &IndexMap::new()).unwrap();

    c.bench_function("integrator_advance", |b| {
        b.iter(|| {
            stepper.advance(black_box(1e-3)).unwrap();
        });
    });
}

/// Benchmark: snapshot capture after a step.
fn bench_snapshot(c: &mut Criterion) {
    let mut stepper = reference_stepper();
    stepper.advance(0.1).unwrap();

    c.bench_function("msd_snapshot", |b| {
        b.iter(|| black_box(stepper.snapshot()));
    });
}

/// Benchmark: 16 mailbox writes across 4 inputs, then one drain.
fn bench_mailbox_write_take(c: &mut Criterion) {
    let mailbox = InputMailbox::new();

    c.bench_function("mailbox_16_writes_take", |b| {
        b.iter(|| {
            for i in 0..16u32 {
                mailbox.write(VarId(i % 4), f64::from(i));
            }
            black_box(mailbox.take());
        });
    });
}

/// Benchmark: closed-loop iteration (PID update + plant step).
fn bench_closed_loop_iteration(c: &mut Criterion) {
    let mut stepper = reference_stepper();
    let u = stepper.registry().input("u").unwrap();
    let pid = Pid::new(10.0, PidGains::new(10.0, 1.0, 2.0));
    let mut state = PidState::new();

    c.bench_function("closed_loop_iteration", |b| {
        b.iter(|| {
            let x = stepper.get_output(&["x"]).unwrap()[0];
            let out = pid.update(&mut state, x, 0.1);
            stepper.stage(u, out.u).unwrap();
            stepper.advance(0.1).unwrap();
        });
    });
}

criterion_group!(
    benches,
    bench_msd_advance,
    bench_integrator_advance,
    bench_snapshot,
    bench_mailbox_write_take,
    bench_closed_loop_iteration
);
criterion_main!(benches);
