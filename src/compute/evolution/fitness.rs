//! Per-tick fitness shaping for racing controllers.
//!
//! Fitness is accumulated tick by tick while an episode runs: a small reward
//! proportional to speed while alive, a bonus for each captured gate and a
//! one-off penalty on the tick a vehicle dies.

use crate::compute::StepOutcome;
use crate::schema::{RewardConfig, SimulationConfig};

/// Computes fitness deltas from per-tick vehicle outcomes.
#[derive(Debug, Clone)]
pub struct RewardShaper {
    config: RewardConfig,
    max_speed: f32,
}

impl RewardShaper {
    /// Create a new reward shaper.
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            config: config.reward.clone(),
            max_speed: config.vehicle.max_speed,
        }
    }

    /// Fitness delta for one vehicle step.
    ///
    /// `speed` is the post-update speed and `captured` whether the next gate
    /// was taken this tick. Vehicles that were already dead earn nothing.
    pub fn tick_delta(&self, speed: f32, captured: bool, outcome: StepOutcome) -> f32 {
        match outcome {
            StepOutcome::Inactive => 0.0,
            StepOutcome::Stalled | StepOutcome::Crashed => -self.config.death_penalty,
            StepOutcome::Running => {
                let mut delta = self.config.speed_reward * (speed / self.max_speed).clamp(0.0, 1.0);
                if captured {
                    delta += self.config.gate_bonus;
                }
                delta
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shaper() -> RewardShaper {
        RewardShaper::new(&SimulationConfig::default())
    }

    #[test]
    fn test_speed_reward_scales_linearly() {
        let s = shaper();
        assert_eq!(s.tick_delta(0.0, false, StepOutcome::Running), 0.0);
        assert!((s.tick_delta(29.0, false, StepOutcome::Running) - 0.1).abs() < 1e-6);
        assert!((s.tick_delta(14.5, false, StepOutcome::Running) - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_gate_bonus() {
        let s = shaper();
        let delta = s.tick_delta(29.0, true, StepOutcome::Running);
        assert!((delta - 200.1).abs() < 1e-4);
    }

    #[test]
    fn test_death_penalty_once() {
        let s = shaper();
        assert_eq!(s.tick_delta(20.0, false, StepOutcome::Crashed), -50.0);
        assert_eq!(s.tick_delta(0.0, false, StepOutcome::Stalled), -50.0);
        assert_eq!(s.tick_delta(0.0, false, StepOutcome::Inactive), 0.0);
    }
}
