//! Kinematic vehicle model with stall and collision kill rules.
//!
//! A vehicle is either alive or dead, and death is terminal. Every tick the
//! controller sets at most one steering command and the throttle, then
//! [`Vehicle::update`] integrates one step and resets both to neutral.
//! Trail, skid marks and smoke are cosmetic only and never feed back into
//! physics or fitness.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::geometry::{Vec2, normalize_degrees, wrap_angle};
use super::raster::{DrivableMask, SkidLayer};
use super::sensor::{SensorReading, cast_fan};
use super::track::Pose;
use crate::schema::{GPS_FEATURES, SensorConfig, VehicleConfig};

/// Distance from the car centre back to the rear axle.
const REAR_AXLE_OFFSET: f32 = 20.0;
/// Half the rear track width.
const REAR_HALF_TRACK: f32 = 12.0;
const SKID_RADIUS: f32 = 3.0;
const SKID_INTENSITY: u8 = 180;
/// Trail sample every Nth tick.
const TRAIL_EVERY: u32 = 2;

/// Steering command for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Steer {
    Left,
    #[default]
    Straight,
    Right,
}

impl Steer {
    #[inline]
    pub fn value(self) -> f32 {
        match self {
            Steer::Left => -1.0,
            Steer::Straight => 0.0,
            Steer::Right => 1.0,
        }
    }
}

/// Decoded controller action for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Command {
    pub steer: Steer,
    pub throttle: bool,
}

/// What happened to a vehicle during one update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Still alive after the step.
    Running,
    /// Died because no gate was captured within the stall window.
    Stalled,
    /// Died because it left the drivable region.
    Crashed,
    /// Already dead before the step; nothing changed.
    Inactive,
}

impl StepOutcome {
    /// Whether the vehicle died during this step.
    #[inline]
    pub fn died(self) -> bool {
        matches!(self, StepOutcome::Stalled | StepOutcome::Crashed)
    }
}

/// Cosmetic drift smoke puff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmokeParticle {
    pub position: Vec2,
    /// Remaining ticks.
    pub life: u32,
    pub size: f32,
}

#[derive(Debug, Clone)]
pub struct Vehicle {
    pub position: Vec2,
    pub velocity: Vec2,
    /// Heading in degrees, kept in `[0, 360)`.
    pub heading: f32,
    throttle: f32,
    steering: f32,
    alive: bool,
    pub distance_traveled: f32,
    pub gates_passed: u32,
    pub next_gate: usize,
    pub ticks_since_gate: u32,
    pub sensors: Vec<SensorReading>,
    pub is_leader: bool,
    ticks: u32,
    /// Recent positions, oldest first.
    pub trail: VecDeque<Vec2>,
    pub smoke: Vec<SmokeParticle>,
    fx_rng: StdRng,
}

impl Vehicle {
    /// Spawn at a pose. `fx_seed` drives cosmetic randomness only.
    pub fn new(start: Pose, fx_seed: u64) -> Self {
        Self {
            position: start.position,
            velocity: Vec2::ZERO,
            heading: normalize_degrees(start.heading),
            throttle: 0.0,
            steering: 0.0,
            alive: true,
            distance_traveled: 0.0,
            gates_passed: 0,
            next_gate: 0,
            ticks_since_gate: 0,
            sensors: Vec::new(),
            is_leader: false,
            ticks: 0,
            trail: VecDeque::new(),
            smoke: Vec::new(),
            fx_rng: StdRng::seed_from_u64(fx_seed),
        }
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    #[inline]
    pub fn speed(&self) -> f32 {
        self.velocity.length()
    }

    /// Current steering input (-1, 0 or 1).
    pub fn steering(&self) -> f32 {
        self.steering
    }

    /// Score used to rank vehicles for the camera.
    #[inline]
    pub fn progress_score(&self) -> f32 {
        self.gates_passed as f32 * 1000.0 + self.distance_traveled
    }

    pub fn steer(&mut self, steer: Steer) {
        self.steering = steer.value();
    }

    /// Open the throttle for this tick.
    pub fn throttle(&mut self) {
        self.throttle = 1.0;
    }

    pub fn apply(&mut self, command: Command) {
        self.steer(command.steer);
        if command.throttle {
            self.throttle();
        }
    }

    /// Advance one tick.
    pub fn update(
        &mut self,
        mask: &DrivableMask,
        skid: Option<&SkidLayer>,
        config: &VehicleConfig,
    ) -> StepOutcome {
        if !self.alive {
            return StepOutcome::Inactive;
        }

        self.ticks_since_gate += 1;
        if self.ticks_since_gate > config.stall_ticks {
            self.alive = false;
            self.reset_commands();
            return StepOutcome::Stalled;
        }

        self.velocity *= config.friction;
        self.velocity += Vec2::from_heading(self.heading) * (self.throttle * config.thrust);
        self.velocity = self.velocity.clamp_length(config.max_speed);

        let speed = self.speed();
        if speed > config.steer_speed_threshold {
            self.heading = normalize_degrees(self.heading + self.steering * speed * config.turn_rate);
        }

        self.position += self.velocity;
        self.distance_traveled += speed;
        self.ticks += 1;

        self.update_cosmetics(speed, skid, config);

        let outcome = if mask.query(self.position).is_drivable() {
            StepOutcome::Running
        } else {
            self.alive = false;
            StepOutcome::Crashed
        };

        self.reset_commands();
        outcome
    }

    fn reset_commands(&mut self) {
        self.throttle = 0.0;
        self.steering = 0.0;
    }

    fn update_cosmetics(&mut self, speed: f32, skid: Option<&SkidLayer>, config: &VehicleConfig) {
        if self.ticks % TRAIL_EVERY == 0 {
            if config.trail_length > 0 {
                while self.trail.len() >= config.trail_length {
                    self.trail.pop_front();
                }
                self.trail.push_back(self.position);
            }
        }

        for particle in &mut self.smoke {
            particle.life = particle.life.saturating_sub(1);
        }
        self.smoke.retain(|p| p.life > 0);

        let drifting = self.steering.abs() > config.drift_steer_threshold
            && speed > config.drift_speed_threshold;
        if !drifting {
            return;
        }

        let forward = Vec2::from_heading(self.heading);
        let side = Vec2::new(-forward.y, forward.x);
        let axle = self.position - forward * REAR_AXLE_OFFSET;
        if let Some(skid) = skid {
            skid.stamp(axle + side * REAR_HALF_TRACK, SKID_RADIUS, SKID_INTENSITY);
            skid.stamp(axle - side * REAR_HALF_TRACK, SKID_RADIUS, SKID_INTENSITY);
        }
        if self.fx_rng.r#gen::<f32>() < config.smoke_chance {
            self.smoke.push(SmokeParticle {
                position: axle,
                life: self.fx_rng.gen_range(15..=25),
                size: self.fx_rng.gen_range(10.0..=20.0),
            });
        }
    }

    /// Capture the next gate if it lies within `radius`.
    pub fn check_gates(&mut self, gates: &[Vec2], radius: f32) -> bool {
        if !self.alive || gates.is_empty() {
            return false;
        }
        let target = gates[self.next_gate % gates.len()];
        if self.position.distance(target) < radius {
            self.gates_passed += 1;
            self.next_gate = (self.next_gate + 1) % gates.len();
            self.ticks_since_gate = 0;
            true
        } else {
            false
        }
    }

    /// Refresh the sensor readings from the current pose.
    pub fn sense(&mut self, mask: &DrivableMask, config: &SensorConfig) {
        self.sensors = cast_fan(self.position, self.heading, mask, config);
    }

    /// Navigation features: heading error to the next gate in `[-1, 1]`,
    /// normalized distance to it in `[0, 1]`, normalized speed.
    /// A dead vehicle reports all zeros.
    pub fn gps(&self, gates: &[Vec2], config: &VehicleConfig) -> [f32; GPS_FEATURES] {
        if !self.alive || gates.is_empty() {
            return [0.0; GPS_FEATURES];
        }
        let target = gates[self.next_gate % gates.len()];
        let to_gate = target - self.position;
        let error = wrap_angle(to_gate.angle() - self.heading.to_radians());
        [
            error / std::f32::consts::PI,
            (to_gate.length() / config.gate_distance_norm).min(1.0),
            self.speed() / config.max_speed,
        ]
    }

    /// Policy input vector: normalized ray distances in fan order, then the
    /// GPS triple.
    pub fn policy_inputs(
        &self,
        gates: &[Vec2],
        sensor: &SensorConfig,
        vehicle: &VehicleConfig,
    ) -> Vec<f32> {
        let mut inputs = Vec::with_capacity(self.sensors.len() + GPS_FEATURES);
        inputs.extend(self.sensors.iter().map(|r| r.distance / sensor.range));
        inputs.extend_from_slice(&self.gps(gates, vehicle));
        inputs
    }
}
