//! Criterion benchmarks for objective evaluation, the neighborhood moves
//! and short annealing runs on generated instances.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use k2_anneal::driver::run_sequential;
use k2_anneal::sa::{Geometric, Mutation, SaParams, Solution};
use k2_anneal::schedule::{generate, k2_objective, Instance, Neighborhood, Schedule};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

const SIZES: [(u32, u32); 3] = [(50, 4), (200, 8), (1000, 16)];

fn instance(jobs: u32, machines: u32) -> Arc<Instance> {
    Arc::new(generate(jobs, machines, 1, 100, 42).expect("valid benchmark instance"))
}

fn bench_objective(c: &mut Criterion) {
    let mut group = c.benchmark_group("k2_objective");

    for (jobs, machines) in SIZES {
        let instance = instance(jobs, machines);
        let schedule = Schedule::random(instance.clone(), &mut ChaCha8Rng::seed_from_u64(1));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("n{jobs}_m{machines}")),
            &schedule,
            |b, s| b.iter(|| black_box(k2_objective(&instance, black_box(s.orders())))),
        );
    }
    group.finish();
}

fn bench_mutations(c: &mut Criterion) {
    let mut group = c.benchmark_group("mutation");

    let instance = instance(200, 8);
    let base = Schedule::random(instance, &mut ChaCha8Rng::seed_from_u64(1));
    for neighborhood in [
        Neighborhood::SwapInMachine,
        Neighborhood::MoveBetweenMachines,
        Neighborhood::ReassignGreedy,
    ] {
        group.bench_function(neighborhood.as_str(), |b| {
            let mut rng = ChaCha8Rng::seed_from_u64(7);
            let mut schedule = base.clone();
            b.iter(|| {
                neighborhood.apply(&mut schedule, &mut rng);
                black_box(schedule.objective())
            })
        });
    }
    group.finish();
}

fn bench_anneal(c: &mut Criterion) {
    let mut group = c.benchmark_group("anneal");
    group.sample_size(10);

    let params = SaParams::default()
        .with_initial_temperature(50.0)
        .with_min_temperature(0.1)
        .with_iterations_per_temperature(50);
    for (jobs, machines) in &SIZES[..2] {
        let instance = instance(*jobs, *machines);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("n{jobs}_m{machines}")),
            &instance,
            |b, inst| {
                b.iter(|| {
                    let best = run_sequential(
                        inst.clone(),
                        &params,
                        Some(42),
                        Neighborhood::Mixed,
                        Geometric::default(),
                    )
                    .expect("valid parameters");
                    black_box(best.objective())
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_objective, bench_mutations, bench_anneal);
criterion_main!(benches);
