//! Episode evaluation: one track, one population, one bounded tick loop.
//!
//! The evaluator owns no controller state. It hands sensor-derived inputs to
//! each entrant's [`Policy`], steps the vehicles, and writes fitness deltas
//! into the entrant's accumulator. Nothing but the aggregate
//! [`EpisodeSummary`] leaves the episode.

use rayon::prelude::*;

use super::camera::{Camera, mark_leader};
use super::evolution::RewardShaper;
use super::raster::SkidLayer;
use super::track::{GeometryError, Track, TrackBuilder};
use super::vehicle::{Command, Steer, StepOutcome, Vehicle};
use crate::capture::{FrameSink, FrameSnapshot};
use crate::schema::{EpisodeConfig, EpisodeMode, NUM_OUTPUTS, SimulationConfig};

/// Controller failures.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("Expected {expected} inputs, got {got}")]
    InputArity { expected: usize, got: usize },
    #[error("Expected {expected} outputs, got {got}")]
    OutputArity { expected: usize, got: usize },
    #[error("Output {0} is not finite")]
    NonFiniteOutput(usize),
    #[error("Controller failed: {0}")]
    Failed(String),
}

/// A controller mapping policy inputs to raw outputs.
pub trait Policy: Send {
    fn decide(&mut self, inputs: &[f32]) -> Result<Vec<f32>, PolicyError>;
}

impl<P: Policy + ?Sized> Policy for Box<P> {
    fn decide(&mut self, inputs: &[f32]) -> Result<Vec<f32>, PolicyError> {
        (**self).decide(inputs)
    }
}

impl<P: Policy + ?Sized> Policy for &mut P {
    fn decide(&mut self, inputs: &[f32]) -> Result<Vec<f32>, PolicyError> {
        (**self).decide(inputs)
    }
}

/// A controller bound to its fitness accumulator for one episode.
pub struct Entrant<'a, P> {
    pub policy: P,
    pub fitness: &'a mut f32,
}

impl<'a, P> Entrant<'a, P> {
    pub fn new(policy: P, fitness: &'a mut f32) -> Self {
        Self { policy, fitness }
    }
}

/// Episode failures.
#[derive(Debug, thiserror::Error)]
pub enum EpisodeError {
    #[error("Track generation failed: {0}")]
    Track(#[from] GeometryError),
    #[error("Controller {entrant} failed: {source}")]
    Policy {
        entrant: usize,
        #[source]
        source: PolicyError,
    },
    #[error("Frame capture failed: {0}")]
    Capture(#[from] std::io::Error),
}

/// Aggregate outcome of one episode.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeSummary {
    pub mode: EpisodeMode,
    pub cycle: usize,
    pub track_seed: u64,
    /// Ticks actually simulated.
    pub ticks: usize,
    /// Gates captured by all vehicles together.
    pub total_gates: u32,
    /// Most gates captured by a single vehicle.
    pub best_gates: u32,
    /// Vehicles still alive when the loop ended.
    pub survivors: usize,
    /// Leader at the end of the episode.
    pub leader: Option<usize>,
}

/// Map raw controller outputs to a command.
///
/// `outputs[0] > t` steers right, `outputs[0] < -t` steers left and
/// `outputs[1] > t` opens the throttle.
pub fn decode_action(outputs: &[f32], config: &EpisodeConfig) -> Result<Command, PolicyError> {
    if outputs.len() != NUM_OUTPUTS {
        return Err(PolicyError::OutputArity {
            expected: NUM_OUTPUTS,
            got: outputs.len(),
        });
    }
    if let Some(i) = outputs.iter().position(|o| !o.is_finite()) {
        return Err(PolicyError::NonFiniteOutput(i));
    }
    let steer = if outputs[0] > config.steer_threshold {
        Steer::Right
    } else if outputs[0] < -config.steer_threshold {
        Steer::Left
    } else {
        Steer::Straight
    };
    Ok(Command {
        steer,
        throttle: outputs[1] > config.throttle_threshold,
    })
}

/// Cosmetic RNG seed of one vehicle.
fn fx_seed(track_seed: u64, cycle: usize, index: usize) -> u64 {
    track_seed
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add((cycle as u64) << 32)
        .wrapping_add(index as u64)
}

/// Runs episodes for one simulation configuration.
pub struct EpisodeEvaluator {
    config: SimulationConfig,
    builder: TrackBuilder,
    rewards: RewardShaper,
}

impl EpisodeEvaluator {
    pub fn new(config: SimulationConfig) -> Self {
        let builder = TrackBuilder::new(&config);
        let rewards = RewardShaper::new(&config);
        Self {
            config,
            builder,
            rewards,
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Build the track used by `cycle`.
    pub fn track_for_cycle(&self, cycle: usize) -> Result<Track, GeometryError> {
        self.builder.build(self.config.track.seed_for_cycle(cycle))
    }

    /// Build a track from an explicit seed.
    pub fn track_for_seed(&self, seed: u64) -> Result<Track, GeometryError> {
        self.builder.build(seed)
    }

    /// Evaluate every entrant on the cycle's track under the mode's budget.
    pub fn evaluate<P: Policy>(
        &self,
        mode: EpisodeMode,
        cycle: usize,
        entrants: &mut [Entrant<'_, P>],
        sink: Option<&mut dyn FrameSink>,
    ) -> Result<EpisodeSummary, EpisodeError> {
        let track = self.track_for_cycle(cycle)?;
        let budget = self.config.episode.tick_budget(mode);
        self.run_on_track(&track, mode, cycle, budget, entrants, sink)
    }

    /// Run the tick loop on a prebuilt track.
    pub fn run_on_track<P: Policy>(
        &self,
        track: &Track,
        mode: EpisodeMode,
        cycle: usize,
        budget: usize,
        entrants: &mut [Entrant<'_, P>],
        mut sink: Option<&mut dyn FrameSink>,
    ) -> Result<EpisodeSummary, EpisodeError> {
        let episode = &self.config.episode;
        let mut vehicles: Vec<Vehicle> = (0..entrants.len())
            .map(|i| Vehicle::new(track.start, fx_seed(track.seed, cycle, i)))
            .collect();
        let skid = sink.as_ref().map(|_| SkidLayer::new(track.world_size()));
        let mut camera = Camera::new(
            track.world_size(),
            self.config.world.viewport,
            &self.config.camera,
        );
        camera.snap_to(track.start.position);
        let mut leader = mark_leader(&mut vehicles);

        log::debug!(
            "Episode cycle={} mode={:?} seed={} entrants={} budget={}",
            cycle,
            mode,
            track.seed,
            entrants.len(),
            budget
        );

        let mut tick = 0;
        while tick < budget && vehicles.iter().any(Vehicle::is_alive) {
            self.step_all(track, skid.as_ref(), &mut vehicles, entrants)?;
            tick += 1;

            leader = mark_leader(&mut vehicles);
            if let Some(l) = leader {
                camera.follow(vehicles[l].position);
            }

            if let Some(sink) = sink.as_deref_mut() {
                let finished = tick >= budget || !vehicles.iter().any(Vehicle::is_alive);
                if tick % episode.capture_interval == 0 || finished {
                    sink.on_frame(&FrameSnapshot {
                        cycle,
                        tick,
                        track,
                        skid: skid.as_ref(),
                        vehicles: &vehicles,
                        camera_offset: camera.offset(),
                        leader,
                    })?;
                }
            }
        }

        let summary = EpisodeSummary {
            mode,
            cycle,
            track_seed: track.seed,
            ticks: tick,
            total_gates: vehicles.iter().map(|v| v.gates_passed).sum(),
            best_gates: vehicles.iter().map(|v| v.gates_passed).max().unwrap_or(0),
            survivors: vehicles.iter().filter(|v| v.is_alive()).count(),
            leader,
        };
        log::debug!("Episode finished: {:?}", summary);
        Ok(summary)
    }

    /// Step every live vehicle once and apply its fitness delta.
    fn step_all<P: Policy>(
        &self,
        track: &Track,
        skid: Option<&SkidLayer>,
        vehicles: &mut [Vehicle],
        entrants: &mut [Entrant<'_, P>],
    ) -> Result<(), EpisodeError> {
        if self.config.episode.parallel {
            vehicles
                .par_iter_mut()
                .zip(entrants.par_iter_mut())
                .enumerate()
                .try_for_each(|(index, (vehicle, entrant))| {
                    self.step_indexed(track, skid, index, vehicle, entrant)
                })
        } else {
            vehicles
                .iter_mut()
                .zip(entrants.iter_mut())
                .enumerate()
                .try_for_each(|(index, (vehicle, entrant))| {
                    self.step_indexed(track, skid, index, vehicle, entrant)
                })
        }
    }

    #[inline]
    fn step_indexed<P: Policy>(
        &self,
        track: &Track,
        skid: Option<&SkidLayer>,
        index: usize,
        vehicle: &mut Vehicle,
        entrant: &mut Entrant<'_, P>,
    ) -> Result<(), EpisodeError> {
        self.step_one(track, skid, vehicle, entrant)
            .map_err(|source| EpisodeError::Policy {
                entrant: index,
                source,
            })
    }

    fn step_one<P: Policy>(
        &self,
        track: &Track,
        skid: Option<&SkidLayer>,
        vehicle: &mut Vehicle,
        entrant: &mut Entrant<'_, P>,
    ) -> Result<(), PolicyError> {
        if !vehicle.is_alive() {
            return Ok(());
        }
        let config = &self.config;
        vehicle.sense(&track.mask, &config.sensor);
        let inputs = vehicle.policy_inputs(&track.gates, &config.sensor, &config.vehicle);
        let outputs = entrant.policy.decide(&inputs)?;
        let command = decode_action(&outputs, &config.episode)?;
        vehicle.apply(command);

        let outcome = vehicle.update(&track.mask, skid, &config.vehicle);
        let captured = outcome == StepOutcome::Running
            && vehicle.check_gates(&track.gates, config.vehicle.gate_radius);
        *entrant.fitness += self.rewards.tick_delta(vehicle.speed(), captured, outcome);
        Ok(())
    }
}
