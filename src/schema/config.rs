//! Configuration types for the racing simulation.
//!
//! Every tunable constant of the track builder, vehicle dynamics, sensors,
//! reward shaping and episode loop lives in one versioned [`SimulationConfig`].
//! Retuning the simulation changes values here, never the algorithm shape.

use serde::{Deserialize, Serialize};

/// Version of the canonical tuning below. Bumped whenever a default changes
/// in a way that makes fitness values incomparable with older checkpoints.
pub const CONFIG_VERSION: u32 = 1;

/// Number of policy outputs: steering and throttle.
pub const NUM_OUTPUTS: usize = 2;

/// Number of navigation features appended after the sensor distances:
/// heading error, distance to next gate, speed.
pub const GPS_FEATURES: usize = 3;

fn default_version() -> u32 {
    CONFIG_VERSION
}

/// Top-level simulation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Tuning version this configuration was written against.
    #[serde(default = "default_version")]
    pub version: u32,
    /// World extents and viewport.
    #[serde(default)]
    pub world: WorldConfig,
    /// Procedural track parameters.
    #[serde(default)]
    pub track: TrackConfig,
    /// Vehicle dynamics constants.
    #[serde(default)]
    pub vehicle: VehicleConfig,
    /// Ray sensor fan.
    #[serde(default)]
    pub sensor: SensorConfig,
    /// Per-tick fitness shaping.
    #[serde(default)]
    pub reward: RewardConfig,
    /// Episode loop budgets and action decoding.
    #[serde(default)]
    pub episode: EpisodeConfig,
    /// Leader camera smoothing.
    #[serde(default)]
    pub camera: CameraConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            world: WorldConfig::default(),
            track: TrackConfig::default(),
            vehicle: VehicleConfig::default(),
            sensor: SensorConfig::default(),
            reward: RewardConfig::default(),
            episode: EpisodeConfig::default(),
            camera: CameraConfig::default(),
        }
    }
}

/// Square world and the viewport the camera frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Side length of the square world in world units (one unit = one mask cell).
    pub size: usize,
    /// Viewport (width, height) in world units.
    pub viewport: (f32, f32),
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            size: 4000,
            viewport: (1080.0, 1920.0),
        }
    }
}

/// Procedural track generation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackConfig {
    /// Base seed for the track generator.
    pub seed: u64,
    /// Derive a fresh layout every cycle instead of reusing `seed`.
    #[serde(default)]
    pub reseed_each_cycle: bool,
    /// Number of spline control points around the loop.
    pub control_points: usize,
    /// Radius band (min, max) the control points are drawn from.
    pub radius_band: (f32, f32),
    /// Number of dense centerline samples.
    pub samples: usize,
    /// Width of the drivable stroke.
    pub road_width: f32,
    /// Every `gate_stride`-th centerline sample becomes a progress gate.
    pub gate_stride: usize,
    /// Samples ahead of the start point used to orient the start heading.
    pub heading_lookahead: usize,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            reseed_each_cycle: false,
            control_points: 20,
            radius_band: (1100.0, 1800.0),
            samples: 5000,
            road_width: 450.0,
            gate_stride: 70,
            heading_lookahead: 5,
        }
    }
}

impl TrackConfig {
    /// Seed used for the track of a given cycle.
    ///
    /// All controllers of one cycle always share this layout.
    pub fn seed_for_cycle(&self, cycle: usize) -> u64 {
        if self.reseed_each_cycle {
            self.seed.wrapping_add(cycle as u64)
        } else {
            self.seed
        }
    }
}

/// Kinematic vehicle constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    /// Speed clamp (world units per tick).
    pub max_speed: f32,
    /// Velocity decay factor applied every tick (< 1).
    pub friction: f32,
    /// Thrust added along the heading when the throttle is on.
    pub thrust: f32,
    /// Heading change in degrees per unit of speed per tick at full lock.
    pub turn_rate: f32,
    /// Below this speed steering has no effect.
    pub steer_speed_threshold: f32,
    /// Ticks allowed without capturing the next gate.
    pub stall_ticks: u32,
    /// Distance at which the next gate counts as captured.
    pub gate_radius: f32,
    /// Distance used to normalize the gate distance input.
    pub gate_distance_norm: f32,
    /// Steering magnitude above which the car is considered drifting.
    pub drift_steer_threshold: f32,
    /// Speed above which the car is considered drifting.
    pub drift_speed_threshold: f32,
    /// Chance of spawning a smoke particle on a drifting tick.
    pub smoke_chance: f32,
    /// Number of recent positions kept for the trail ribbon.
    pub trail_length: usize,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            max_speed: 29.0,
            friction: 0.97,
            thrust: 1.2,
            turn_rate: 0.18,
            steer_speed_threshold: 2.0,
            stall_ticks: 90,
            gate_radius: 300.0,
            gate_distance_norm: 1000.0,
            drift_steer_threshold: 0.5,
            drift_speed_threshold: 15.0,
            smoke_chance: 0.3,
            trail_length: 40,
        }
    }
}

/// Ray sensor fan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Ray offsets from the heading, in degrees, in input order.
    pub angles: Vec<f32>,
    /// Maximum ray length.
    pub range: f32,
    /// March increment along each ray.
    pub step: f32,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            angles: vec![-60.0, -30.0, 0.0, 30.0, 60.0],
            range: 300.0,
            step: 20.0,
        }
    }
}

/// Fitness deltas written by the episode loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Reward per tick at full speed (scaled linearly by speed).
    pub speed_reward: f32,
    /// Bonus for capturing a gate.
    pub gate_bonus: f32,
    /// Penalty applied on the tick a vehicle dies.
    pub death_penalty: f32,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            speed_reward: 0.1,
            gate_bonus: 200.0,
            death_penalty: 50.0,
        }
    }
}

/// Which tick budget an episode runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpisodeMode {
    /// Regular learning cycle with the short budget.
    Training,
    /// Final cycle of a batch, run long for footage.
    Showcase,
}

/// Episode loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpisodeConfig {
    /// Tick cap for training cycles.
    pub training_ticks: usize,
    /// Tick cap for showcase cycles.
    pub showcase_ticks: usize,
    /// Emit a frame snapshot every N ticks when a capture sink is attached.
    pub capture_interval: usize,
    /// `outputs[0]` above this steers right, below its negation steers left.
    pub steer_threshold: f32,
    /// `outputs[1]` above this opens the throttle.
    pub throttle_threshold: f32,
    /// Step vehicles of one tick in parallel.
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

fn default_parallel() -> bool {
    true
}

impl Default for EpisodeConfig {
    fn default() -> Self {
        Self {
            training_ticks: 450,
            showcase_ticks: 1800,
            capture_interval: 1,
            steer_threshold: 0.5,
            throttle_threshold: 0.5,
            parallel: default_parallel(),
        }
    }
}

impl EpisodeConfig {
    /// Tick budget for the given mode.
    #[inline]
    pub fn tick_budget(&self, mode: EpisodeMode) -> usize {
        match mode {
            EpisodeMode::Training => self.training_ticks,
            EpisodeMode::Showcase => self.showcase_ticks,
        }
    }
}

/// Leader camera settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Fraction of the remaining distance covered each tick.
    pub smoothing: f32,
    /// Keep the viewport inside the rasterized world.
    pub clamp_to_world: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            smoothing: 0.1,
            clamp_to_world: true,
        }
    }
}

impl SimulationConfig {
    /// Length of the policy input vector: one value per ray plus the GPS triple.
    #[inline]
    pub fn num_inputs(&self) -> usize {
        self.sensor.angles.len() + GPS_FEATURES
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != CONFIG_VERSION {
            return Err(ConfigError::VersionMismatch {
                found: self.version,
                expected: CONFIG_VERSION,
            });
        }
        if self.world.size < 16 {
            return Err(ConfigError::InvalidWorldSize(self.world.size));
        }
        if self.world.viewport.0 <= 0.0 || self.world.viewport.1 <= 0.0 {
            return Err(ConfigError::InvalidViewport);
        }

        let track = &self.track;
        if track.control_points < 4 {
            return Err(ConfigError::TooFewControlPoints(track.control_points));
        }
        let (r_min, r_max) = track.radius_band;
        if r_min <= 0.0 || r_min > r_max || r_max >= self.world.size as f32 / 2.0 {
            return Err(ConfigError::InvalidRadiusBand(r_min, r_max));
        }
        if track.samples < track.control_points * 8 {
            return Err(ConfigError::TooFewSamples(track.samples));
        }
        if track.road_width <= 0.0 || track.road_width / 2.0 >= r_min {
            return Err(ConfigError::InvalidRoadWidth(track.road_width));
        }
        if track.gate_stride == 0 || track.gate_stride >= track.samples {
            return Err(ConfigError::InvalidGateStride(track.gate_stride));
        }
        if track.heading_lookahead == 0 || track.heading_lookahead >= track.samples {
            return Err(ConfigError::InvalidLookahead(track.heading_lookahead));
        }

        let vehicle = &self.vehicle;
        if !(vehicle.friction > 0.0 && vehicle.friction < 1.0) {
            return Err(ConfigError::InvalidFriction(vehicle.friction));
        }
        if vehicle.max_speed <= 0.0 || vehicle.thrust < 0.0 {
            return Err(ConfigError::InvalidSpeed);
        }
        if vehicle.stall_ticks == 0 {
            return Err(ConfigError::InvalidStallTicks);
        }
        if vehicle.gate_radius <= 0.0 || vehicle.gate_distance_norm <= 0.0 {
            return Err(ConfigError::InvalidGateRadius(vehicle.gate_radius));
        }

        if self.sensor.angles.is_empty() {
            return Err(ConfigError::NoSensors);
        }
        if self.sensor.step <= 0.0 || self.sensor.range < self.sensor.step {
            return Err(ConfigError::InvalidSensorRange {
                range: self.sensor.range,
                step: self.sensor.step,
            });
        }

        if self.episode.training_ticks == 0 || self.episode.showcase_ticks == 0 {
            return Err(ConfigError::InvalidTickBudget);
        }
        if self.episode.capture_interval == 0 {
            return Err(ConfigError::InvalidCaptureInterval);
        }
        if !(self.camera.smoothing > 0.0 && self.camera.smoothing <= 1.0) {
            return Err(ConfigError::InvalidSmoothing(self.camera.smoothing));
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config version {found} does not match the canonical version {expected}")]
    VersionMismatch { found: u32, expected: u32 },
    #[error("World size {0} is too small")]
    InvalidWorldSize(usize),
    #[error("Viewport dimensions must be positive")]
    InvalidViewport,
    #[error("At least 4 control points are required, got {0}")]
    TooFewControlPoints(usize),
    #[error("Radius band ({0}, {1}) must be positive, ordered and fit inside the world")]
    InvalidRadiusBand(f32, f32),
    #[error("Centerline sample count {0} is too small for the control point count")]
    TooFewSamples(usize),
    #[error("Road width {0} must be positive and narrower than the inner radius")]
    InvalidRoadWidth(f32),
    #[error("Gate stride {0} must be non-zero and below the sample count")]
    InvalidGateStride(usize),
    #[error("Heading lookahead {0} must be non-zero and below the sample count")]
    InvalidLookahead(usize),
    #[error("Friction {0} must lie strictly between 0 and 1")]
    InvalidFriction(f32),
    #[error("Max speed must be positive and thrust non-negative")]
    InvalidSpeed,
    #[error("Stall timeout must be at least one tick")]
    InvalidStallTicks,
    #[error("Gate radius {0} and gate distance normalization must be positive")]
    InvalidGateRadius(f32),
    #[error("Sensor fan must contain at least one ray")]
    NoSensors,
    #[error("Sensor range {range} must be at least one step ({step}) and the step positive")]
    InvalidSensorRange { range: f32, step: f32 },
    #[error("Tick budgets must be non-zero")]
    InvalidTickBudget,
    #[error("Capture interval must be non-zero")]
    InvalidCaptureInterval,
    #[error("Camera smoothing {0} must lie in (0, 1]")]
    InvalidSmoothing(f32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = SimulationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.num_inputs(), 8);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: SimulationConfig =
            serde_json::from_str(r#"{ "vehicle": { "max_speed": 20.0, "friction": 0.96,
                "thrust": 1.0, "turn_rate": 0.2, "steer_speed_threshold": 2.0,
                "stall_ticks": 80, "gate_radius": 250.0, "gate_distance_norm": 1000.0,
                "drift_steer_threshold": 0.5, "drift_speed_threshold": 15.0,
                "smoke_chance": 0.3, "trail_length": 40 } }"#)
                .unwrap();
        assert_eq!(config.vehicle.stall_ticks, 80);
        assert_eq!(config.track, TrackConfig::default());
        assert_eq!(config.version, CONFIG_VERSION);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_nested_block_fills_defaults() {
        let config: SimulationConfig = serde_json::from_str(
            r#"{ "vehicle": { "stall_ticks": 60 }, "track": { "seed": 7 },
                 "sensor": { "range": 250.0 } }"#,
        )
        .unwrap();
        assert_eq!(config.vehicle.stall_ticks, 60);
        assert_eq!(config.vehicle.friction, VehicleConfig::default().friction);
        assert_eq!(config.track.seed, 7);
        assert_eq!(config.track.samples, TrackConfig::default().samples);
        assert_eq!(config.sensor.range, 250.0);
        assert_eq!(config.sensor.angles, SensorConfig::default().angles);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_reject_bad_friction() {
        let mut config = SimulationConfig::default();
        config.vehicle.friction = 1.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidFriction(_))
        ));
    }

    #[test]
    fn test_reject_radius_outside_world() {
        let mut config = SimulationConfig::default();
        config.track.radius_band = (1100.0, 2100.0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRadiusBand(..))
        ));
    }

    #[test]
    fn test_reject_version_mismatch() {
        let config = SimulationConfig {
            version: CONFIG_VERSION + 1,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn test_seed_for_cycle() {
        let mut track = TrackConfig::default();
        assert_eq!(track.seed_for_cycle(7), track.seed);
        track.reseed_each_cycle = true;
        assert_eq!(track.seed_for_cycle(7), track.seed + 7);
    }

    #[test]
    fn test_tick_budget_by_mode() {
        let episode = EpisodeConfig::default();
        assert!(episode.tick_budget(EpisodeMode::Training) < episode.tick_budget(EpisodeMode::Showcase));
    }
}
