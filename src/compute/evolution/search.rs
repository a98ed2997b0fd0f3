//! Genetic search over fixed-topology controller networks.

use serde::{Deserialize, Serialize};

use crate::compute::{EpisodeError, Entrant};
use crate::schema::{
    CandidateSnapshot, EvolutionConfig, EvolutionHistory, EvolutionProgress, Genome,
};

use super::checkpoint::{CHECKPOINT_VERSION, Checkpoint, CheckpointError};
use super::genome::GenomeRng;
use super::network::FeedForwardNetwork;

/// A candidate individual in the population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Unique identifier.
    pub id: u64,
    /// The genome.
    pub genome: Genome,
    /// Fitness collected in the most recent evaluation.
    pub fitness: f32,
    /// Generation created.
    pub generation: usize,
    /// Parent IDs.
    pub parents: Vec<u64>,
}

impl Candidate {
    /// Convert to snapshot for reporting.
    pub fn to_snapshot(&self) -> CandidateSnapshot {
        CandidateSnapshot {
            id: self.id,
            fitness: self.fitness,
            generation: self.generation,
            parents: self.parents.clone(),
        }
    }
}

/// Evolution engine that owns the population between cycles.
///
/// The engine never runs a simulation itself: [`run_cycle`](Self::run_cycle)
/// hands one [`Entrant`] per candidate to a caller-supplied evaluation and
/// reads the accumulated fitness back afterwards.
pub struct EvolutionEngine {
    config: EvolutionConfig,
    layers: Vec<usize>,
    rng: GenomeRng,
    population: Vec<Candidate>,
    history: EvolutionHistory,
    /// Number of generations evaluated so far.
    generation: usize,
    best_fitness: f32,
    stagnation_count: usize,
    next_id: u64,
    /// Best candidate of the last evaluated generation.
    generation_best: Option<CandidateSnapshot>,
}

impl EvolutionEngine {
    /// Create a new evolution engine.
    pub fn new(config: EvolutionConfig) -> Self {
        let seed = config.random_seed.unwrap_or_else(rand::random);
        let layers = config.network.layer_sizes(&config.simulation);

        Self {
            config,
            layers,
            rng: GenomeRng::new(seed),
            population: Vec::new(),
            history: EvolutionHistory::default(),
            generation: 0,
            best_fitness: f32::NEG_INFINITY,
            stagnation_count: 0,
            next_id: 0,
            generation_best: None,
        }
    }

    /// Restore an engine from a checkpoint.
    ///
    /// Every stored genome must match the layer layout implied by `config`.
    pub fn from_checkpoint(
        config: EvolutionConfig,
        checkpoint: Checkpoint,
    ) -> Result<Self, CheckpointError> {
        let layers = config.network.layer_sizes(&config.simulation);
        if let Some(c) = checkpoint
            .population
            .iter()
            .find(|c| c.genome.layers != layers || !c.genome.is_consistent())
        {
            return Err(CheckpointError::IncompatibleGenome {
                id: c.id,
                expected: layers,
                found: c.genome.layers.clone(),
            });
        }

        let generation_best = checkpoint
            .population
            .iter()
            .max_by(|a, b| a.fitness.total_cmp(&b.fitness))
            .filter(|_| checkpoint.generation > 0)
            .map(Candidate::to_snapshot);

        Ok(Self {
            config,
            layers,
            rng: GenomeRng::new(checkpoint.rng_seed),
            population: checkpoint.population,
            history: checkpoint.history,
            generation: checkpoint.generation,
            best_fitness: checkpoint.best_fitness.unwrap_or(f32::NEG_INFINITY),
            stagnation_count: checkpoint.stagnation_count,
            next_id: checkpoint.next_id,
            generation_best,
        })
    }

    /// Initialize the population with random genomes.
    pub fn initialize(&mut self) {
        self.population.clear();

        for _ in 0..self.config.population.size {
            let genome = self.rng.random_genome(&self.layers, &self.config.network);
            let id = self.next_id;
            self.next_id += 1;

            self.population.push(Candidate {
                id,
                genome,
                fitness: 0.0,
                generation: self.generation,
                parents: Vec::new(),
            });
        }
    }

    /// Evaluate the current population and breed the next one.
    ///
    /// Fitness accumulators start at zero. `evaluate` receives one entrant
    /// per candidate in population order; on error the population is left
    /// unevaluated and the generation counter does not advance.
    pub fn run_cycle<T, F>(&mut self, evaluate: F) -> Result<T, EpisodeError>
    where
        F: FnOnce(&mut [Entrant<'_, FeedForwardNetwork>]) -> Result<T, EpisodeError>,
    {
        if self.population.is_empty() {
            self.initialize();
        }

        let activation = self.config.network.activation;
        let networks = self
            .population
            .iter()
            .enumerate()
            .map(|(entrant, c)| {
                FeedForwardNetwork::new(&c.genome, activation)
                    .map_err(|source| EpisodeError::Policy { entrant, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut fitness = vec![0.0f32; self.population.len()];
        let mut entrants: Vec<_> = networks
            .into_iter()
            .zip(fitness.iter_mut())
            .map(|(network, slot)| Entrant::new(network, slot))
            .collect();
        let result = evaluate(&mut entrants);
        drop(entrants);
        let output = result?;

        for (candidate, f) in self.population.iter_mut().zip(fitness) {
            candidate.fitness = f;
        }
        self.record_generation();
        self.reproduce();
        Ok(output)
    }

    /// Rank the evaluated population and update best/stagnation/history.
    fn record_generation(&mut self) {
        self.population.sort_by(|a, b| b.fitness.total_cmp(&a.fitness));

        let Some(gen_best) = self.population.first().map(|c| c.fitness) else {
            return;
        };
        if gen_best > self.best_fitness {
            self.best_fitness = gen_best;
            self.stagnation_count = 0;
        } else {
            self.stagnation_count += 1;
        }

        let fitnesses: Vec<f32> = self.population.iter().map(|c| c.fitness).collect();
        self.history.record(&fitnesses);
        self.generation_best = Some(self.population[0].to_snapshot());
        self.generation += 1;

        log::debug!(
            "Generation {} ranked: best={:.2} avg={:.2} stagnation={}",
            self.generation,
            gen_best,
            self.history.avg_fitness.last().copied().unwrap_or(0.0),
            self.stagnation_count
        );
    }

    /// Breed the next generation from the ranked population.
    fn reproduce(&mut self) {
        let algorithm = self.config.algorithm.clone();
        let size = self.config.population.size;
        let n = self.population.len();
        if n == 0 {
            return;
        }
        let survivors = ((n as f32 * algorithm.survival_threshold).ceil() as usize).clamp(1, n);

        let mut next_gen = Vec::with_capacity(size);

        // Elitism: keep best individuals unchanged.
        for elite in self.population.iter().take(algorithm.elitism.min(n)) {
            next_gen.push(elite.clone());
        }

        while next_gen.len() < size {
            let idx1 = self.select_index(survivors);
            let idx2 = self.select_index(survivors);
            let parent1 = &self.population[idx1];
            let parent2 = &self.population[idx2];

            let (mut child, parents) = if self.rng.unit() < algorithm.crossover_rate {
                (
                    self.rng.crossover(&parent1.genome, &parent2.genome),
                    vec![parent1.id, parent2.id],
                )
            } else {
                (parent1.genome.clone(), vec![parent1.id])
            };

            self.rng.mutate(&mut child, &algorithm, &self.config.network);

            let id = self.next_id;
            self.next_id += 1;
            next_gen.push(Candidate {
                id,
                genome: child,
                fitness: 0.0,
                generation: self.generation,
                parents,
            });
        }

        self.population = next_gen;
    }

    /// Tournament selection among the first `pool` ranked candidates.
    fn select_index(&mut self, pool: usize) -> usize {
        let mut best_idx = self.rng.index(pool);
        for _ in 1..self.config.algorithm.tournament_size {
            let idx = self.rng.index(pool);
            if self.population[idx].fitness > self.population[best_idx].fitness {
                best_idx = idx;
            }
        }
        best_idx
    }

    /// Get current progress.
    pub fn progress(&self) -> EvolutionProgress {
        EvolutionProgress {
            generation: self.generation,
            best_fitness: self.best_fitness,
            avg_fitness: self.history.avg_fitness.last().copied().unwrap_or(0.0),
            generation_best: self
                .history
                .best_fitness
                .last()
                .copied()
                .unwrap_or(f32::NEG_INFINITY),
            stagnation_count: self.stagnation_count,
            best_candidate: self.generation_best.clone(),
        }
    }

    /// Number of generations evaluated so far.
    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn population(&self) -> &[Candidate] {
        &self.population
    }

    pub fn history(&self) -> &EvolutionHistory {
        &self.history
    }

    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    /// Capture the engine state.
    ///
    /// The random stream is reseeded from itself so that a run restored from
    /// this checkpoint continues exactly like the uninterrupted one.
    pub fn checkpoint(&mut self) -> Checkpoint {
        let rng_seed = self.rng.next_seed();
        self.rng = GenomeRng::new(rng_seed);

        Checkpoint {
            version: CHECKPOINT_VERSION,
            generation: self.generation,
            next_id: self.next_id,
            rng_seed,
            best_fitness: self.best_fitness.is_finite().then_some(self.best_fitness),
            stagnation_count: self.stagnation_count,
            population: self.population.clone(),
            history: self.history.clone(),
        }
    }
}
