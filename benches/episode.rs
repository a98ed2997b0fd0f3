//! Benchmarks for track synthesis and episode evaluation.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use race_evolve::{
    EpisodeEvaluator, EvolutionConfig, EvolutionEngine, SimulationConfig, TrackBuilder,
    compute::Entrant, orchestrator::RandomDriver, schema::EpisodeMode,
};

/// Simulation scaled so the track fits a `size` pixel world.
fn scaled_config(size: usize) -> SimulationConfig {
    let mut config = SimulationConfig::default();
    let scale = size as f32 / config.world.size as f32;
    config.world.size = size;
    let (r_min, r_max) = config.track.radius_band;
    config.track.radius_band = (r_min * scale, r_max * scale);
    config.track.road_width *= scale;
    config.vehicle.gate_radius *= scale;
    config
}

fn bench_track_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("track_build");
    group.sample_size(10);

    for size in [1200, 2400, 4800] {
        let builder = TrackBuilder::new(&scaled_config(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| builder.build(black_box(7)));
        });
    }

    group.finish();
}

fn bench_random_episode(c: &mut Criterion) {
    let mut group = c.benchmark_group("random_episode");
    group.sample_size(10);

    let evaluator = EpisodeEvaluator::new(scaled_config(2400));
    let track = match evaluator.track_for_seed(42) {
        Ok(track) => track,
        Err(e) => panic!("benchmark track failed to build: {e}"),
    };

    for drivers in [10, 40, 160] {
        group.bench_with_input(BenchmarkId::from_parameter(drivers), &drivers, |b, &n| {
            b.iter(|| {
                let mut fitness = vec![0.0f32; n];
                let mut entrants: Vec<_> = fitness
                    .iter_mut()
                    .enumerate()
                    .map(|(i, slot)| Entrant::new(RandomDriver::new(i as u64), slot))
                    .collect();
                evaluator
                    .run_on_track(&track, EpisodeMode::Training, 0, 300, &mut entrants, None)
                    .map(|summary| black_box(summary.total_gates))
            });
        });
    }

    group.finish();
}

fn bench_evolution_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("evolution_cycle");
    group.sample_size(10);

    let mut config = EvolutionConfig {
        simulation: scaled_config(2400),
        random_seed: Some(42),
        ..Default::default()
    };
    config.simulation.episode.training_ticks = 200;

    for parallel in [false, true] {
        config.simulation.episode.parallel = parallel;
        let evaluator = EpisodeEvaluator::new(config.simulation.clone());
        let mut engine = EvolutionEngine::new(config.clone());
        engine.initialize();
        let label = if parallel { "parallel" } else { "serial" };

        group.bench_function(label, |b| {
            b.iter(|| {
                let generation = engine.generation() + 1;
                engine.run_cycle(|entrants| {
                    evaluator.evaluate(EpisodeMode::Training, generation, entrants, None)
                })
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_track_build,
    bench_random_episode,
    bench_evolution_cycle
);
criterion_main!(benches);
