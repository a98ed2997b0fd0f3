//! Neuroevolution of racing controllers.
//!
//! # Overview
//!
//! - **Fitness shaping** (`fitness`): per-tick reward for speed, gates and death
//! - **Genome operations** (`genome`): random generation, crossover, and mutation
//! - **Networks** (`network`): feed-forward controllers decoded from genomes
//! - **Search** (`search`): genetic algorithm with elitism and tournament selection
//! - **Checkpoints** (`checkpoint`): numbered JSON snapshots of the population
//!
//! # Example
//!
//! ```rust,no_run
//! use race_evolve::compute::EpisodeEvaluator;
//! use race_evolve::compute::evolution::EvolutionEngine;
//! use race_evolve::schema::{EpisodeMode, EvolutionConfig};
//!
//! let config = EvolutionConfig::default();
//! let evaluator = EpisodeEvaluator::new(config.simulation.clone());
//! let mut engine = EvolutionEngine::new(config);
//!
//! for cycle in 0..5 {
//!     let summary = engine
//!         .run_cycle(|entrants| evaluator.evaluate(EpisodeMode::Training, cycle, entrants, None))
//!         .unwrap();
//!     println!("cycle {cycle}: {} gates, best fitness {:.1}",
//!         summary.total_gates, engine.progress().best_fitness);
//! }
//! ```

mod checkpoint;
mod fitness;
mod genome;
mod network;
mod search;

pub use checkpoint::{CHECKPOINT_VERSION, Checkpoint, CheckpointError, CheckpointStore};
pub use fitness::RewardShaper;
pub use genome::GenomeRng;
pub use network::FeedForwardNetwork;
pub use search::{Candidate, EvolutionEngine};
