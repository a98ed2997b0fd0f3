//! Evolution configuration types for training racing controllers.
//!
//! This module provides the population, genetic operator, network shape,
//! checkpoint, capture and bootstrap settings consumed by the orchestrator,
//! plus the serializable genome and history records it persists.

use serde::{Deserialize, Serialize};

use super::{ConfigError, NUM_OUTPUTS, SimulationConfig};

/// Top-level configuration for a training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionConfig {
    /// Simulation the population is evaluated in.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Population and batch settings.
    #[serde(default)]
    pub population: PopulationConfig,
    /// Genetic operators.
    #[serde(default)]
    pub algorithm: GeneticAlgorithmConfig,
    /// Controller network shape and initialization.
    #[serde(default)]
    pub network: NetworkConfig,
    /// Checkpoint directory and cadence.
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    /// Frame capture for the external renderer.
    #[serde(default)]
    pub capture: CaptureConfig,
    /// One-off random-driver episode run before the first population exists.
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
    /// Random seed for reproducibility.
    #[serde(default)]
    pub random_seed: Option<u64>,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            population: PopulationConfig::default(),
            algorithm: GeneticAlgorithmConfig::default(),
            network: NetworkConfig::default(),
            checkpoint: CheckpointConfig::default(),
            capture: CaptureConfig::default(),
            bootstrap: BootstrapConfig::default(),
            random_seed: None,
        }
    }
}

/// Population and batch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationConfig {
    /// Number of controllers evaluated per cycle.
    #[serde(default = "default_population_size")]
    pub size: usize,
    /// Number of cycles run by one invocation before exiting.
    #[serde(default = "default_cycles_per_run")]
    pub cycles_per_run: usize,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            size: default_population_size(),
            cycles_per_run: default_cycles_per_run(),
        }
    }
}

fn default_population_size() -> usize {
    40
}
fn default_cycles_per_run() -> usize {
    20
}

/// Genetic algorithm configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneticAlgorithmConfig {
    /// Number of best individuals copied unchanged into the next generation.
    #[serde(default = "default_elitism")]
    pub elitism: usize,
    /// Fraction of the ranked population allowed to reproduce.
    #[serde(default = "default_survival_threshold")]
    pub survival_threshold: f32,
    /// Tournament size used when drawing parents from the survivors.
    #[serde(default = "default_tournament_size")]
    pub tournament_size: usize,
    /// Probability of recombining two parents instead of cloning one.
    #[serde(default = "default_crossover_rate")]
    pub crossover_rate: f32,
    /// Per-weight probability of a Gaussian perturbation.
    #[serde(default = "default_weight_mutate_rate")]
    pub weight_mutate_rate: f32,
    /// Per-bias probability of a Gaussian perturbation.
    #[serde(default = "default_bias_mutate_rate")]
    pub bias_mutate_rate: f32,
    /// Standard deviation of a perturbation.
    #[serde(default = "default_mutate_power")]
    pub mutate_power: f32,
    /// Per-gene probability of replacing the value with a fresh draw.
    #[serde(default = "default_replace_rate")]
    pub replace_rate: f32,
}

impl Default for GeneticAlgorithmConfig {
    fn default() -> Self {
        Self {
            elitism: default_elitism(),
            survival_threshold: default_survival_threshold(),
            tournament_size: default_tournament_size(),
            crossover_rate: default_crossover_rate(),
            weight_mutate_rate: default_weight_mutate_rate(),
            bias_mutate_rate: default_bias_mutate_rate(),
            mutate_power: default_mutate_power(),
            replace_rate: default_replace_rate(),
        }
    }
}

fn default_elitism() -> usize {
    2
}
fn default_survival_threshold() -> f32 {
    0.2
}
fn default_tournament_size() -> usize {
    3
}
fn default_crossover_rate() -> f32 {
    0.75
}
fn default_weight_mutate_rate() -> f32 {
    0.3
}
fn default_bias_mutate_rate() -> f32 {
    0.2
}
fn default_mutate_power() -> f32 {
    0.5
}
fn default_replace_rate() -> f32 {
    0.1
}

/// Activation applied by every network layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Activation {
    #[default]
    Tanh,
    Sigmoid,
    Relu,
}

impl Activation {
    #[inline]
    pub fn apply(self, x: f32) -> f32 {
        match self {
            Activation::Tanh => x.tanh(),
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Activation::Relu => x.max(0.0),
        }
    }
}

/// Controller network shape and initialization.
///
/// Input and output widths are not configured here; they follow from
/// [`SimulationConfig::num_inputs`] and [`NUM_OUTPUTS`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Hidden layer widths, input to output.
    #[serde(default = "default_hidden_layers")]
    pub hidden_layers: Vec<usize>,
    /// Activation for hidden and output layers.
    #[serde(default)]
    pub activation: Activation,
    /// Standard deviation of freshly drawn weights and biases.
    #[serde(default = "default_init_stdev")]
    pub init_stdev: f32,
    /// Symmetric clamp applied to every gene after mutation.
    #[serde(default = "default_weight_bound")]
    pub weight_bound: f32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            hidden_layers: default_hidden_layers(),
            activation: Activation::default(),
            init_stdev: default_init_stdev(),
            weight_bound: default_weight_bound(),
        }
    }
}

fn default_hidden_layers() -> Vec<usize> {
    vec![6]
}
fn default_init_stdev() -> f32 {
    1.0
}
fn default_weight_bound() -> f32 {
    30.0
}

impl NetworkConfig {
    /// Full layer widths for a simulation: inputs, hidden layers, outputs.
    pub fn layer_sizes(&self, simulation: &SimulationConfig) -> Vec<usize> {
        let mut layers = Vec::with_capacity(self.hidden_layers.len() + 2);
        layers.push(simulation.num_inputs());
        layers.extend_from_slice(&self.hidden_layers);
        layers.push(NUM_OUTPUTS);
        layers
    }
}

/// Checkpoint directory and cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Directory holding `checkpoint-<generation>.json` files.
    #[serde(default = "default_checkpoint_dir")]
    pub directory: String,
    /// Save every N cycles (the final cycle of a run is always saved).
    #[serde(default = "default_checkpoint_interval")]
    pub interval: usize,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            directory: default_checkpoint_dir(),
            interval: default_checkpoint_interval(),
        }
    }
}

fn default_checkpoint_dir() -> String {
    "checkpoints".to_string()
}
fn default_checkpoint_interval() -> usize {
    5
}

/// Frame capture settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Whether capture files are written at all.
    #[serde(default = "default_capture_enabled")]
    pub enabled: bool,
    /// Directory receiving `cycle_XXXXX.rcap` files.
    #[serde(default = "default_capture_dir")]
    pub directory: String,
    /// Capture every N cycles in addition to the first and last of a run.
    #[serde(default = "default_every_n_cycles")]
    pub every_n_cycles: usize,
    /// Record every Nth emitted frame.
    #[serde(default = "default_frame_skip")]
    pub frame_skip: u32,
    /// Stop recording after this many frames.
    #[serde(default)]
    pub max_frames: Option<u64>,
    /// Compress frame payloads with LZ4 (requires the `lz4` feature).
    #[serde(default)]
    pub compress: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            enabled: default_capture_enabled(),
            directory: default_capture_dir(),
            every_n_cycles: default_every_n_cycles(),
            frame_skip: default_frame_skip(),
            max_frames: None,
            compress: false,
        }
    }
}

fn default_capture_enabled() -> bool {
    true
}
fn default_capture_dir() -> String {
    "training_clips".to_string()
}
fn default_every_n_cycles() -> usize {
    10
}
fn default_frame_skip() -> u32 {
    1
}

/// Random-driver episode run once before a fresh population is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// Run the bootstrap episode when no checkpoint exists.
    #[serde(default = "default_bootstrap_enabled")]
    pub enabled: bool,
    /// Track seed for the bootstrap episode.
    #[serde(default = "default_bootstrap_seed")]
    pub seed: u64,
    /// Number of random drivers.
    #[serde(default = "default_bootstrap_drivers")]
    pub drivers: usize,
    /// Tick cap for the bootstrap episode.
    #[serde(default = "default_bootstrap_ticks")]
    pub ticks: usize,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            enabled: default_bootstrap_enabled(),
            seed: default_bootstrap_seed(),
            drivers: default_bootstrap_drivers(),
            ticks: default_bootstrap_ticks(),
        }
    }
}

fn default_bootstrap_enabled() -> bool {
    true
}
fn default_bootstrap_seed() -> u64 {
    42
}
fn default_bootstrap_drivers() -> usize {
    40
}
fn default_bootstrap_ticks() -> usize {
    300
}

// ============================================================================
// Genome Representation
// ============================================================================

/// Fixed-topology feed-forward network parameters.
///
/// Weights are stored layer by layer, row-major per output neuron:
/// the weight from input `i` to output `o` of layer `l` lives at
/// `offset(l) + o * layers[l] + i`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genome {
    /// Layer widths including inputs and outputs.
    pub layers: Vec<usize>,
    /// Flattened connection weights.
    pub weights: Vec<f32>,
    /// Flattened biases, one per non-input neuron.
    pub biases: Vec<f32>,
}

impl Genome {
    /// Zero-initialized genome for the given layer widths.
    pub fn zeros(layers: &[usize]) -> Self {
        Self {
            layers: layers.to_vec(),
            weights: vec![0.0; Self::weight_count(layers)],
            biases: vec![0.0; Self::bias_count(layers)],
        }
    }

    /// Number of connection weights implied by `layers`.
    pub fn weight_count(layers: &[usize]) -> usize {
        layers.windows(2).map(|w| w[0] * w[1]).sum()
    }

    /// Number of biases implied by `layers`.
    pub fn bias_count(layers: &[usize]) -> usize {
        layers.iter().skip(1).sum()
    }

    /// Get the total number of evolvable parameters.
    pub fn parameter_count(&self) -> usize {
        self.weights.len() + self.biases.len()
    }

    /// Width of the input layer.
    pub fn num_inputs(&self) -> usize {
        self.layers.first().copied().unwrap_or(0)
    }

    /// Width of the output layer.
    pub fn num_outputs(&self) -> usize {
        self.layers.last().copied().unwrap_or(0)
    }

    /// Whether the flattened vectors match the declared layer widths.
    pub fn is_consistent(&self) -> bool {
        self.layers.len() >= 2
            && self.layers.iter().all(|&w| w > 0)
            && self.weights.len() == Self::weight_count(&self.layers)
            && self.biases.len() == Self::bias_count(&self.layers)
    }
}

// ============================================================================
// Progress and History Types
// ============================================================================

/// Progress update reported after every cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionProgress {
    /// Generation that was just evaluated.
    pub generation: usize,
    /// Best fitness seen so far.
    pub best_fitness: f32,
    /// Average fitness of the evaluated population.
    pub avg_fitness: f32,
    /// Best fitness this generation.
    pub generation_best: f32,
    /// Generations since last improvement.
    pub stagnation_count: usize,
    /// Best candidate of the evaluated generation.
    pub best_candidate: Option<CandidateSnapshot>,
}

/// Snapshot of a candidate for reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateSnapshot {
    /// Unique identifier.
    pub id: u64,
    /// Fitness score.
    pub fitness: f32,
    /// Generation this candidate was created.
    pub generation: usize,
    /// Parent IDs (for genealogy).
    pub parents: Vec<u64>,
}

/// Evolution history for plotting.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct EvolutionHistory {
    /// Best fitness per generation.
    pub best_fitness: Vec<f32>,
    /// Average fitness per generation.
    pub avg_fitness: Vec<f32>,
    /// Standard deviation per generation.
    pub fitness_std: Vec<f32>,
}

impl EvolutionHistory {
    /// Append the statistics of one evaluated generation.
    pub fn record(&mut self, fitnesses: &[f32]) {
        if fitnesses.is_empty() {
            return;
        }
        let n = fitnesses.len() as f32;
        let best = fitnesses.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let avg = fitnesses.iter().sum::<f32>() / n;
        let variance = fitnesses.iter().map(|f| (f - avg).powi(2)).sum::<f32>() / n;
        self.best_fitness.push(best);
        self.avg_fitness.push(avg);
        self.fitness_std.push(variance.sqrt());
    }

    /// Number of recorded generations.
    pub fn len(&self) -> usize {
        self.best_fitness.len()
    }

    pub fn is_empty(&self) -> bool {
        self.best_fitness.is_empty()
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Evolution configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum EvolutionConfigError {
    #[error("Population size must be at least 2")]
    PopulationTooSmall,
    #[error("Cycles per run must be positive")]
    NoCycles,
    #[error("Elitism {elitism} must be smaller than the population size {size}")]
    TooManyElites { elitism: usize, size: usize },
    #[error("Invalid rate: {0}")]
    InvalidRate(String),
    #[error("Tournament size must be positive")]
    InvalidTournament,
    #[error("Hidden layer widths must be positive")]
    InvalidLayer,
    #[error("Checkpoint interval must be positive")]
    InvalidCheckpointInterval,
    #[error("Capture cadence and frame skip must be positive")]
    InvalidCapture,
    #[error("Bootstrap needs at least one driver and one tick")]
    InvalidBootstrap,
    #[error("Simulation config validation failed: {0}")]
    SimulationConfigError(#[from] ConfigError),
}

impl EvolutionConfig {
    /// Validate evolution configuration.
    pub fn validate(&self) -> Result<(), EvolutionConfigError> {
        self.simulation.validate()?;

        if self.population.size < 2 {
            return Err(EvolutionConfigError::PopulationTooSmall);
        }
        if self.population.cycles_per_run == 0 {
            return Err(EvolutionConfigError::NoCycles);
        }
        if self.algorithm.elitism >= self.population.size {
            return Err(EvolutionConfigError::TooManyElites {
                elitism: self.algorithm.elitism,
                size: self.population.size,
            });
        }

        let check_rate = |rate: f32, name: &str| {
            if (0.0..=1.0).contains(&rate) {
                Ok(())
            } else {
                Err(EvolutionConfigError::InvalidRate(format!(
                    "{name} ({rate}) must lie in [0, 1]"
                )))
            }
        };
        check_rate(self.algorithm.survival_threshold, "survival_threshold")?;
        check_rate(self.algorithm.crossover_rate, "crossover_rate")?;
        check_rate(self.algorithm.weight_mutate_rate, "weight_mutate_rate")?;
        check_rate(self.algorithm.bias_mutate_rate, "bias_mutate_rate")?;
        check_rate(self.algorithm.replace_rate, "replace_rate")?;
        if self.algorithm.survival_threshold == 0.0 {
            return Err(EvolutionConfigError::InvalidRate(
                "survival_threshold must be positive".to_string(),
            ));
        }
        if self.algorithm.tournament_size == 0 {
            return Err(EvolutionConfigError::InvalidTournament);
        }

        if self.network.hidden_layers.contains(&0) {
            return Err(EvolutionConfigError::InvalidLayer);
        }
        if self.checkpoint.interval == 0 {
            return Err(EvolutionConfigError::InvalidCheckpointInterval);
        }
        if self.capture.every_n_cycles == 0 || self.capture.frame_skip == 0 {
            return Err(EvolutionConfigError::InvalidCapture);
        }
        if self.bootstrap.drivers == 0 || self.bootstrap.ticks == 0 {
            return Err(EvolutionConfigError::InvalidBootstrap);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = EvolutionConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_layer_sizes_follow_simulation() {
        let config = EvolutionConfig::default();
        let layers = config.network.layer_sizes(&config.simulation);
        assert_eq!(layers, vec![8, 6, 2]);
        assert_eq!(Genome::weight_count(&layers), 8 * 6 + 6 * 2);
        assert_eq!(Genome::bias_count(&layers), 8);
    }

    #[test]
    fn test_genome_consistency() {
        let mut genome = Genome::zeros(&[3, 4, 2]);
        assert!(genome.is_consistent());
        assert_eq!(genome.parameter_count(), 12 + 8 + 6);
        genome.weights.pop();
        assert!(!genome.is_consistent());
    }

    #[test]
    fn test_history_record() {
        let mut history = EvolutionHistory::default();
        history.record(&[1.0, 3.0]);
        history.record(&[]);
        assert_eq!(history.len(), 1);
        assert_eq!(history.best_fitness[0], 3.0);
        assert_eq!(history.avg_fitness[0], 2.0);
        assert!((history.fitness_std[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_rates_rejected() {
        let mut config = EvolutionConfig::default();
        config.algorithm.weight_mutate_rate = 1.5;
        assert!(matches!(
            config.validate(),
            Err(EvolutionConfigError::InvalidRate(_))
        ));
    }

    #[test]
    fn test_simulation_error_wrapped() {
        let mut config = EvolutionConfig::default();
        config.simulation.vehicle.stall_ticks = 0;
        assert!(matches!(
            config.validate(),
            Err(EvolutionConfigError::SimulationConfigError(_))
        ));
    }

    #[test]
    fn test_serialization() {
        let config = EvolutionConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: EvolutionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.population.size, config.population.size);
        assert_eq!(parsed.network.hidden_layers, config.network.hidden_layers);
    }

    #[test]
    fn test_empty_json_is_default() {
        let parsed: EvolutionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed.population.size, 40);
        assert_eq!(parsed.checkpoint.interval, 5);
        assert!(parsed.validate().is_ok());
    }
}
