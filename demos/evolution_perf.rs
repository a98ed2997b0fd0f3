//! Quick evolution performance test

use race_evolve::{
    EpisodeEvaluator, EvolutionConfig, EvolutionEngine,
    schema::{EpisodeMode, PopulationConfig, SimulationConfig},
};
use std::time::Instant;

fn scaled_simulation(size: usize) -> SimulationConfig {
    let mut config = SimulationConfig::default();
    let scale = size as f32 / config.world.size as f32;
    config.world.size = size;
    let (r_min, r_max) = config.track.radius_band;
    config.track.radius_band = (r_min * scale, r_max * scale);
    config.track.road_width *= scale;
    config.vehicle.gate_radius *= scale;
    config.episode.training_ticks = 300;
    config
}

fn run(config: EvolutionConfig, generations: usize) -> (usize, f32, f64) {
    let evaluator = EpisodeEvaluator::new(config.simulation.clone());
    let mut engine = EvolutionEngine::new(config);
    let mut evaluations = 0;

    let start = Instant::now();
    for _ in 0..generations {
        let generation = engine.generation() + 1;
        let result = engine.run_cycle(|entrants| {
            evaluations += entrants.len();
            evaluator.evaluate(EpisodeMode::Training, generation, entrants, None)
        });
        if let Err(e) = result {
            eprintln!("  Generation {} failed: {}", generation, e);
            break;
        }
    }
    let elapsed = start.elapsed().as_secs_f64();

    (evaluations, engine.progress().best_fitness, elapsed)
}

fn main() {
    println!("=== Evolution Performance Test ===\n");

    // Test different world sizes
    for world_size in [1200, 2400, 4000] {
        println!("World size: {}px", world_size);

        let config = EvolutionConfig {
            simulation: scaled_simulation(world_size),
            population: PopulationConfig {
                size: 20,
                ..Default::default()
            },
            random_seed: Some(42),
            ..Default::default()
        };

        let (evaluations, best, elapsed) = run(config, 10);

        println!("  Evaluations:    {}", evaluations);
        println!("  Elapsed:        {:.2}s", elapsed);
        println!("  Evals/sec:      {:.1}", evaluations as f64 / elapsed);
        println!("  Best fitness:   {:.4}", best);
        println!();
    }

    println!("=== Scalability Test (fixed 2400px world) ===\n");

    // Test different population sizes
    for pop_size in [10, 20, 40, 80] {
        let config = EvolutionConfig {
            simulation: scaled_simulation(2400),
            population: PopulationConfig {
                size: pop_size,
                ..Default::default()
            },
            random_seed: Some(42),
            ..Default::default()
        };

        let (evaluations, _, elapsed) = run(config, 5);

        println!(
            "Population {}: {} evals in {:.2}s ({:.1} evals/sec)",
            pop_size,
            evaluations,
            elapsed,
            evaluations as f64 / elapsed
        );
    }
}
