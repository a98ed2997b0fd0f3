//! Ray-marched distance sensors.

use super::geometry::Vec2;
use super::raster::DrivableMask;
use crate::schema::SensorConfig;

/// One ray's result: where it stopped and how far it travelled.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorReading {
    pub endpoint: Vec2,
    /// Travelled length, always within `[0, range]`.
    pub distance: f32,
}

/// March a single ray from `origin` along `angle` degrees.
///
/// The ray advances by `step` (never past `range`) and stops on the first
/// sample that is off track or outside the world.
pub fn cast_ray(origin: Vec2, angle: f32, mask: &DrivableMask, range: f32, step: f32) -> SensorReading {
    let dir = Vec2::from_heading(angle);
    let mut length = 0.0f32;
    let mut endpoint = origin;
    while length < range {
        length = (length + step).min(range);
        endpoint = origin + dir * length;
        if !mask.query(endpoint).is_drivable() {
            break;
        }
    }
    SensorReading { endpoint, distance: length }
}

/// Cast the configured fan around `heading`, in fan order.
pub fn cast_fan(position: Vec2, heading: f32, mask: &DrivableMask, config: &SensorConfig) -> Vec<SensorReading> {
    config
        .angles
        .iter()
        .map(|offset| cast_ray(position, heading + offset, mask, config.range, config.step))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn strip_mask() -> DrivableMask {
        // Horizontal corridor, rows 40..60 drivable.
        let mut mask = DrivableMask::new(200);
        for x in 0..200 {
            mask.fill_disk(Vec2::new(x as f32 + 0.5, 50.0), 10.0);
        }
        mask
    }

    #[test]
    fn test_open_ray_reaches_range() {
        let mask = strip_mask();
        let r = cast_ray(Vec2::new(20.0, 50.0), 0.0, &mask, 100.0, 20.0);
        assert_eq!(r.distance, 100.0);
        assert!((r.endpoint.x - 120.0).abs() < 1e-3);
    }

    #[test]
    fn test_ray_stops_at_wall() {
        let mask = strip_mask();
        // Straight down the corridor wall is ~10 units away; first step lands outside.
        let r = cast_ray(Vec2::new(100.0, 50.0), 90.0, &mask, 100.0, 20.0);
        assert_eq!(r.distance, 20.0);
        assert!(!mask.query(r.endpoint).is_drivable());
    }

    #[test]
    fn test_ray_stops_out_of_bounds() {
        let mask = strip_mask();
        let r = cast_ray(Vec2::new(190.0, 50.0), 0.0, &mask, 100.0, 20.0);
        assert_eq!(r.distance, 20.0);
    }

    #[test]
    fn test_last_step_clamped_to_range() {
        let mask = strip_mask();
        let r = cast_ray(Vec2::new(20.0, 50.0), 0.0, &mask, 50.0, 20.0);
        assert_eq!(r.distance, 50.0);
    }

    #[test]
    fn test_fan_order() {
        let mask = strip_mask();
        let config = SensorConfig {
            angles: vec![-90.0, 0.0, 90.0],
            range: 60.0,
            step: 5.0,
        };
        let readings = cast_fan(Vec2::new(100.0, 50.0), 0.0, &mask, &config);
        assert_eq!(readings.len(), 3);
        assert!(readings[0].endpoint.y < 50.0);
        assert_eq!(readings[1].distance, 60.0);
        assert!(readings[2].endpoint.y > 50.0);
    }

    proptest! {
        #[test]
        fn prop_distance_within_range(
            x in -50.0f32..250.0,
            y in -50.0f32..250.0,
            angle in -720.0f32..720.0,
            range in 1.0f32..400.0,
            step in 0.5f32..40.0,
        ) {
            let mask = strip_mask();
            let r = cast_ray(Vec2::new(x, y), angle, &mask, range, step);
            prop_assert!(r.distance >= 0.0);
            prop_assert!(r.distance <= range);
        }
    }
}
