//! Genome manipulation utilities for controller evolution.
//!
//! Provides random generation, crossover, and mutation operations over
//! fixed-topology network genomes.

use crate::schema::{GeneticAlgorithmConfig, Genome, NetworkConfig};
use rand::prelude::*;

/// Random number generator wrapper for genome operations.
pub struct GenomeRng {
    rng: StdRng,
}

impl GenomeRng {
    /// Create from seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Generate a random genome for the given layer widths.
    ///
    /// Weights and biases are drawn from `N(0, init_stdev)` and clamped to
    /// the network's weight bound.
    pub fn random_genome(&mut self, layers: &[usize], network: &NetworkConfig) -> Genome {
        let mut genome = Genome::zeros(layers);
        for w in genome.weights.iter_mut().chain(genome.biases.iter_mut()) {
            *w = self.fresh_gene(network);
        }
        genome
    }

    /// A newly drawn gene value.
    fn fresh_gene(&mut self, network: &NetworkConfig) -> f32 {
        let noise: f32 = self.rng.sample(rand_distr::StandardNormal);
        (noise * network.init_stdev).clamp(-network.weight_bound, network.weight_bound)
    }

    /// Uniform draw in `[0, 1)`.
    pub fn unit(&mut self) -> f32 {
        self.rng.r#gen()
    }

    /// Uniform index below `n`.
    pub fn index(&mut self, n: usize) -> usize {
        self.rng.gen_range(0..n)
    }

    /// Gaussian mutation: add noise to a value.
    pub fn gaussian_mutate(&mut self, value: f32, power: f32, bound: f32) -> f32 {
        let noise: f32 = self.rng.sample(rand_distr::StandardNormal);
        (value + noise * power).clamp(-bound, bound)
    }

    /// Uniform crossover: each gene comes from either parent with equal odds.
    ///
    /// Parents must share a layout; otherwise the first parent is cloned.
    pub fn crossover(&mut self, parent1: &Genome, parent2: &Genome) -> Genome {
        if parent1.layers != parent2.layers {
            return parent1.clone();
        }
        let mut pick = |a: &[f32], b: &[f32]| -> Vec<f32> {
            a.iter()
                .zip(b)
                .map(|(&x, &y)| if self.rng.gen_bool(0.5) { x } else { y })
                .collect()
        };
        let weights = pick(&parent1.weights, &parent2.weights);
        let biases = pick(&parent1.biases, &parent2.biases);
        Genome {
            layers: parent1.layers.clone(),
            weights,
            biases,
        }
    }

    /// Mutate a genome in place.
    ///
    /// Each gene is either replaced by a fresh draw (`replace_rate`) or,
    /// with the per-kind mutate rate, perturbed by `N(0, mutate_power)`.
    pub fn mutate(
        &mut self,
        genome: &mut Genome,
        algorithm: &GeneticAlgorithmConfig,
        network: &NetworkConfig,
    ) {
        for i in 0..genome.weights.len() {
            genome.weights[i] =
                self.mutate_gene(genome.weights[i], algorithm.weight_mutate_rate, algorithm, network);
        }
        for i in 0..genome.biases.len() {
            genome.biases[i] =
                self.mutate_gene(genome.biases[i], algorithm.bias_mutate_rate, algorithm, network);
        }
    }

    fn mutate_gene(
        &mut self,
        value: f32,
        mutate_rate: f32,
        algorithm: &GeneticAlgorithmConfig,
        network: &NetworkConfig,
    ) -> f32 {
        let roll = self.unit();
        if roll < algorithm.replace_rate {
            self.fresh_gene(network)
        } else if roll < algorithm.replace_rate + mutate_rate {
            self.gaussian_mutate(value, algorithm.mutate_power, network.weight_bound)
        } else {
            value
        }
    }

    /// Generate next u64 for seeding child RNGs.
    pub fn next_seed(&mut self) -> u64 {
        self.rng.r#gen()
    }
}
