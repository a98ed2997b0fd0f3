//! Batch driver: resume or bootstrap, evolve for a fixed number of cycles,
//! checkpoint and capture along the way, then exit.

use std::fs;
use std::io;
use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::capture::{CaptureRecorder, CaptureStats, FrameSink, RecorderConfig, capture_path};
use crate::compute::evolution::{CheckpointError, CheckpointStore, EvolutionEngine};
use crate::compute::{EpisodeError, EpisodeEvaluator, EpisodeSummary, Entrant, Policy, PolicyError};
use crate::schema::{EpisodeMode, EvolutionConfig, EvolutionConfigError, EvolutionProgress};

/// Chance per tick that a random driver picks a new steering direction.
const RESTEER_CHANCE: f64 = 0.1;

/// Run failures.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] EvolutionConfigError),
    #[error(transparent)]
    Episode(#[from] EpisodeError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error("I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// Untrained controller for the bootstrap episode: full throttle, with a
/// steering direction that is occasionally re-rolled and otherwise held.
pub struct RandomDriver {
    rng: StdRng,
    steer: f32,
}

impl RandomDriver {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            steer: 0.0,
        }
    }
}

impl Policy for RandomDriver {
    fn decide(&mut self, _inputs: &[f32]) -> Result<Vec<f32>, PolicyError> {
        if self.rng.gen_bool(RESTEER_CHANCE) {
            self.steer = *[-1.0, 0.0, 1.0].choose(&mut self.rng).unwrap_or(&0.0);
        }
        Ok(vec![self.steer, 1.0])
    }
}

/// How a run obtained its population.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    /// No checkpoint existed: bootstrap (if enabled) and a random population.
    Fresh,
    /// Restored from the checkpoint of this generation.
    Resumed { generation: usize },
}

/// Outcome of one evolution cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// Generation number of the evaluated population, starting at 1.
    pub generation: usize,
    pub mode: EpisodeMode,
    pub summary: EpisodeSummary,
    pub progress: EvolutionProgress,
    pub capture: Option<CaptureStats>,
    pub checkpoint: Option<PathBuf>,
}

/// Outcome of a whole batch.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub start: StartMode,
    pub bootstrap: Option<EpisodeSummary>,
    pub cycles: Vec<CycleReport>,
}

impl RunReport {
    /// Generation reached at the end of the batch.
    pub fn final_generation(&self) -> Option<usize> {
        self.cycles.last().map(|c| c.generation)
    }
}

/// Runs one batch of evolution cycles.
pub struct Orchestrator {
    config: EvolutionConfig,
    evaluator: EpisodeEvaluator,
    store: CheckpointStore,
}

impl Orchestrator {
    /// Validate the configuration and set up the evaluator and checkpoint store.
    pub fn new(config: EvolutionConfig) -> Result<Self, RunError> {
        config.validate()?;
        let evaluator = EpisodeEvaluator::new(config.simulation.clone());
        let store = CheckpointStore::new(&config.checkpoint.directory);
        Ok(Self {
            config,
            evaluator,
            store,
        })
    }

    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// Run one batch.
    pub fn run(&self) -> Result<RunReport, RunError> {
        self.run_with_callback(|_| {})
    }

    /// Run one batch, reporting each finished cycle.
    pub fn run_with_callback<F>(&self, mut callback: F) -> Result<RunReport, RunError>
    where
        F: FnMut(&CycleReport),
    {
        if self.config.capture.enabled {
            self.clear_previous_captures()?;
        }

        let (mut engine, start, bootstrap) = match self.store.load_latest()? {
            Some(checkpoint) => {
                let generation = checkpoint.generation;
                log::info!(
                    "Resuming from generation {} in {}",
                    generation,
                    self.store.directory().display()
                );
                let engine = EvolutionEngine::from_checkpoint(self.config.clone(), checkpoint)?;
                (engine, StartMode::Resumed { generation }, None)
            }
            None => {
                log::info!(
                    "No checkpoint in {}, starting fresh",
                    self.store.directory().display()
                );
                let bootstrap = if self.config.bootstrap.enabled {
                    Some(self.run_bootstrap()?)
                } else {
                    None
                };
                (EvolutionEngine::new(self.config.clone()), StartMode::Fresh, bootstrap)
            }
        };
        if engine.population().is_empty() {
            engine.initialize();
        }

        let start_generation = engine.generation();
        let final_generation = start_generation + self.config.population.cycles_per_run;
        let mut cycles = Vec::with_capacity(self.config.population.cycles_per_run);

        while engine.generation() < final_generation {
            let report = self.run_cycle(&mut engine, start_generation, final_generation)?;
            callback(&report);
            cycles.push(report);
        }

        log::info!(
            "Batch finished at generation {} (best fitness {:.1})",
            engine.generation(),
            engine.progress().best_fitness
        );
        Ok(RunReport {
            start,
            bootstrap,
            cycles,
        })
    }

    fn run_cycle(
        &self,
        engine: &mut EvolutionEngine,
        start_generation: usize,
        final_generation: usize,
    ) -> Result<CycleReport, RunError> {
        let generation = engine.generation() + 1;
        let is_final = generation >= final_generation;
        let mode = if is_final {
            EpisodeMode::Showcase
        } else {
            EpisodeMode::Training
        };

        let mut recorder = if self.should_capture(generation, start_generation, final_generation) {
            Some(self.recorder(generation, engine.population().len(), is_final)?)
        } else {
            None
        };

        let evaluator = &self.evaluator;
        let summary = engine.run_cycle(|entrants| {
            let sink = recorder.as_mut().map(|r| r as &mut dyn FrameSink);
            evaluator.evaluate(mode, generation, entrants, sink)
        })?;
        let capture = recorder.map(CaptureRecorder::finalize).transpose()?;

        let checkpoint = if generation % self.config.checkpoint.interval == 0 || is_final {
            Some(self.store.save(&engine.checkpoint())?)
        } else {
            None
        };

        let progress = engine.progress();
        log::info!(
            "Generation {} ({:?}): best {:.1}, avg {:.1}, all-time {:.1}, gates {}, survivors {}",
            generation,
            mode,
            progress.generation_best,
            progress.avg_fitness,
            progress.best_fitness,
            summary.total_gates,
            summary.survivors
        );
        if let Some(stats) = &capture {
            log::info!("Captured {}", stats);
        }

        Ok(CycleReport {
            generation,
            mode,
            summary,
            progress,
            capture,
            checkpoint,
        })
    }

    /// Capture the first and final cycles of the batch and every Nth generation.
    fn should_capture(&self, generation: usize, start: usize, end: usize) -> bool {
        let capture = &self.config.capture;
        capture.enabled
            && (generation == start + 1
                || generation % capture.every_n_cycles == 0
                || generation >= end)
    }

    fn recorder(
        &self,
        cycle: usize,
        vehicles: usize,
        showcase: bool,
    ) -> Result<CaptureRecorder, RunError> {
        let simulation = &self.config.simulation;
        let recorder = CaptureRecorder::new(
            capture_path(&self.config.capture.directory, cycle),
            simulation,
            simulation.track.seed_for_cycle(cycle),
            cycle,
            vehicles,
            RecorderConfig::from_capture(&self.config.capture, showcase),
        )?;
        Ok(recorder)
    }

    /// Random drivers on the bootstrap track, captured as cycle 0. Nothing
    /// learns from this episode.
    fn run_bootstrap(&self) -> Result<EpisodeSummary, RunError> {
        let bootstrap = &self.config.bootstrap;
        log::info!(
            "Bootstrap: {} random drivers for {} ticks",
            bootstrap.drivers,
            bootstrap.ticks
        );

        let track = self
            .evaluator
            .track_for_seed(bootstrap.seed)
            .map_err(EpisodeError::from)?;

        let mut fitness = vec![0.0f32; bootstrap.drivers];
        let mut entrants: Vec<_> = fitness
            .iter_mut()
            .enumerate()
            .map(|(i, slot)| Entrant::new(RandomDriver::new(bootstrap.seed.wrapping_add(i as u64)), slot))
            .collect();

        let mut recorder = if self.config.capture.enabled {
            let recorder = CaptureRecorder::new(
                capture_path(&self.config.capture.directory, 0),
                &self.config.simulation,
                track.seed,
                0,
                bootstrap.drivers,
                RecorderConfig::from_capture(&self.config.capture, false),
            )?;
            Some(recorder)
        } else {
            None
        };

        let summary = self.evaluator.run_on_track(
            &track,
            EpisodeMode::Training,
            0,
            bootstrap.ticks,
            &mut entrants,
            recorder.as_mut().map(|r| r as &mut dyn FrameSink),
        )?;
        if let Some(recorder) = recorder {
            log::info!("Captured {}", recorder.finalize()?);
        }

        log::info!(
            "Bootstrap finished after {} ticks with {} gates",
            summary.ticks,
            summary.total_gates
        );
        Ok(summary)
    }

    /// Remove capture files left by an earlier batch.
    fn clear_previous_captures(&self) -> Result<(), RunError> {
        let directory = PathBuf::from(&self.config.capture.directory);
        if !directory.exists() {
            return Ok(());
        }
        for entry in fs::read_dir(&directory)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "rcap") {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}
