//! Race Evolve - Neuroevolved lap racing on procedural tracks.
//!
//! This crate synthesizes closed-loop race tracks from a seed, drives a
//! population of ray-sensing cars around them with feed-forward network
//! controllers, and evolves those controllers generation by generation.
//! Training survives restarts through checkpoints, and selected episodes
//! are captured frame by frame for an external renderer.
//!
//! # Architecture
//!
//! - `schema`: Configuration, theme and evolution record types
//! - `compute`: Track geometry, vehicle physics, sensors, episodes and evolution
//! - `capture`: Binary frame capture files and the snapshot/sink seam
//! - `orchestrator`: Batch driver tying resume, evaluation and persistence together
//!
//! # Example
//!
//! ```rust,no_run
//! use race_evolve::{EvolutionConfig, Orchestrator};
//!
//! let mut config = EvolutionConfig::default();
//! config.population.cycles_per_run = 5;
//!
//! let orchestrator = Orchestrator::new(config).expect("valid config");
//! let report = orchestrator.run().expect("batch failed");
//!
//! for cycle in &report.cycles {
//!     println!(
//!         "generation {}: best {:.1}, gates {}",
//!         cycle.generation, cycle.progress.generation_best, cycle.summary.total_gates
//!     );
//! }
//! ```

pub mod capture;
pub mod compute;
pub mod orchestrator;
pub mod schema;

// Re-export commonly used types
pub use compute::evolution::{CheckpointStore, EvolutionEngine};
pub use compute::{EpisodeEvaluator, EpisodeSummary, TrackBuilder};
pub use orchestrator::{Orchestrator, RunError, RunReport};
pub use schema::{EvolutionConfig, SimulationConfig};
