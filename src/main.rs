//! Race Evolve CLI - Run a batch of evolution cycles from JSON configuration.

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use race_evolve::{
    EvolutionConfig, Orchestrator,
    orchestrator::{CycleReport, StartMode},
};

fn main() {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <config.json> [cycles]", args[0]);
        eprintln!();
        eprintln!("Evolve racing controllers for one batch of cycles, resuming");
        eprintln!("from the newest checkpoint when one exists.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  config.json  Path to evolution configuration file");
        eprintln!("  cycles       Cycles to run in this batch (default: from config)");
        eprintln!();
        eprintln!("Example configuration is generated with --example flag.");
        std::process::exit(1);
    }

    if args[1] == "--example" {
        print_example_config();
        return;
    }

    let config_path = PathBuf::from(&args[1]);

    let config_str = fs::read_to_string(&config_path).unwrap_or_else(|e| {
        eprintln!("Error reading config file: {}", e);
        std::process::exit(1);
    });

    let mut config: EvolutionConfig = serde_json::from_str(&config_str).unwrap_or_else(|e| {
        eprintln!("Error parsing config: {}", e);
        std::process::exit(1);
    });

    if let Some(arg) = args.get(2) {
        config.population.cycles_per_run = arg.parse().unwrap_or_else(|_| {
            eprintln!("Invalid cycle count: {}", arg);
            std::process::exit(1);
        });
    }

    println!("Race Evolve");
    println!("===========");
    println!(
        "World: {}px, viewport {}x{}",
        config.simulation.world.size,
        config.simulation.world.viewport.0,
        config.simulation.world.viewport.1
    );
    println!("Population: {}", config.population.size);
    println!("Network: {:?}", config.network.layer_sizes(&config.simulation));
    println!("Cycles: {}", config.population.cycles_per_run);
    println!("Checkpoints: {}", config.checkpoint.directory);
    if config.capture.enabled {
        println!("Captures: {}", config.capture.directory);
    }
    println!();

    let orchestrator = Orchestrator::new(config).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });

    let start = Instant::now();
    let report = orchestrator
        .run_with_callback(print_cycle)
        .unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        });
    let elapsed = start.elapsed();

    println!();
    match report.start {
        StartMode::Fresh => println!("Started fresh"),
        StartMode::Resumed { generation } => println!("Resumed from generation {}", generation),
    }
    if let Some(bootstrap) = &report.bootstrap {
        println!(
            "Bootstrap: {} ticks, {} gates",
            bootstrap.ticks, bootstrap.total_gates
        );
    }
    if let Some(last) = report.cycles.last() {
        println!("Final generation: {}", last.generation);
        println!("All-time best fitness: {:.2}", last.progress.best_fitness);
        println!("Stagnation: {} generations", last.progress.stagnation_count);
    }
    println!(
        "Time: {:.2}s ({:.2} cycles/s)",
        elapsed.as_secs_f32(),
        report.cycles.len() as f32 / elapsed.as_secs_f32()
    );
}

fn print_cycle(cycle: &CycleReport) {
    print!(
        "  Gen {:>4} {:?}: best={:.2} avg={:.2} gates={} survivors={} ticks={}",
        cycle.generation,
        cycle.mode,
        cycle.progress.generation_best,
        cycle.progress.avg_fitness,
        cycle.summary.total_gates,
        cycle.summary.survivors,
        cycle.summary.ticks
    );
    if let Some(stats) = &cycle.capture {
        print!(" [captured {} frames]", stats.frame_count);
    }
    if let Some(path) = &cycle.checkpoint {
        print!(" [saved {}]", path.display());
    }
    println!();
}

fn print_example_config() {
    let config = EvolutionConfig::default();

    println!("Example configuration (config.json):");
    match serde_json::to_string_pretty(&config) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing config: {}", e);
            std::process::exit(1);
        }
    }
}
