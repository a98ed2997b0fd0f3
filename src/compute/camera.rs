//! Leader selection and smoothed camera follow.

use super::geometry::Vec2;
use super::vehicle::Vehicle;
use crate::schema::CameraConfig;

/// Index of the live vehicle with the highest progress score.
///
/// Ties go to the lowest index. Returns `None` when every vehicle is dead.
pub fn select_leader(vehicles: &[Vehicle]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, v) in vehicles.iter().enumerate() {
        if !v.is_alive() {
            continue;
        }
        let score = v.progress_score();
        match best {
            Some((_, s)) if score <= s => {}
            _ => best = Some((i, score)),
        }
    }
    best.map(|(i, _)| i)
}

/// Select the leader and update every vehicle's `is_leader` flag.
pub fn mark_leader(vehicles: &mut [Vehicle]) -> Option<usize> {
    let leader = select_leader(vehicles);
    for (i, v) in vehicles.iter_mut().enumerate() {
        v.is_leader = Some(i) == leader;
    }
    leader
}

/// Smoothed viewport offset. World-to-screen is `point + offset`.
#[derive(Debug, Clone)]
pub struct Camera {
    offset: Vec2,
    viewport: Vec2,
    world_size: f32,
    smoothing: f32,
    clamp_to_world: bool,
}

impl Camera {
    pub fn new(world_size: usize, viewport: (f32, f32), config: &CameraConfig) -> Self {
        Self {
            offset: Vec2::ZERO,
            viewport: Vec2::new(viewport.0, viewport.1),
            world_size: world_size as f32,
            smoothing: config.smoothing,
            clamp_to_world: config.clamp_to_world,
        }
    }

    #[inline]
    pub fn offset(&self) -> Vec2 {
        self.offset
    }

    /// Offset that would centre `target` in the viewport.
    pub fn target_offset(&self, target: Vec2) -> Vec2 {
        let mut desired = -target + self.viewport * 0.5;
        if self.clamp_to_world {
            let min_x = -(self.world_size - self.viewport.x);
            let min_y = -(self.world_size - self.viewport.y);
            desired.x = desired.x.max(min_x).min(0.0);
            desired.y = desired.y.max(min_y).min(0.0);
        }
        desired
    }

    /// Move a fraction of the way towards centring `target`.
    pub fn follow(&mut self, target: Vec2) {
        let desired = self.target_offset(target);
        self.offset += (desired - self.offset) * self.smoothing;
    }

    /// Jump straight to `target` without smoothing.
    pub fn snap_to(&mut self, target: Vec2) {
        self.offset = self.target_offset(target);
    }

    #[inline]
    pub fn world_to_screen(&self, point: Vec2) -> Vec2 {
        point + self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::track::Pose;

    fn car_at(x: f32) -> Vehicle {
        Vehicle::new(
            Pose {
                position: Vec2::new(x, 100.0),
                heading: 0.0,
            },
            0,
        )
    }

    #[test]
    fn test_leader_by_gates_then_distance() {
        let mut cars = vec![car_at(0.0), car_at(1.0), car_at(2.0)];
        cars[0].distance_traveled = 900.0;
        cars[1].gates_passed = 1;
        cars[2].distance_traveled = 999.0;
        assert_eq!(select_leader(&cars), Some(1));
        assert_eq!(mark_leader(&mut cars), Some(1));
        assert!(cars[1].is_leader && !cars[0].is_leader && !cars[2].is_leader);
    }

    #[test]
    fn test_leader_tie_lowest_index() {
        let cars = vec![car_at(0.0), car_at(1.0), car_at(2.0)];
        assert_eq!(select_leader(&cars), Some(0));
    }

    #[test]
    fn test_no_leader_when_all_dead() {
        use crate::compute::raster::DrivableMask;
        let mask = DrivableMask::new(10);
        let config = crate::schema::VehicleConfig::default();
        let mut cars = vec![car_at(500.0), car_at(600.0)];
        for car in &mut cars {
            car.update(&mask, None, &config);
        }
        assert_eq!(mark_leader(&mut cars), None);
        assert!(cars.iter().all(|c| !c.is_leader));
    }

    #[test]
    fn test_follow_converges_and_clamps() {
        let config = CameraConfig::default();
        let mut camera = Camera::new(4000, (1080.0, 1920.0), &config);
        let target = Vec2::new(2000.0, 2000.0);
        camera.follow(target);
        let expected = Vec2::new(-1460.0, -1040.0) * 0.1;
        assert!(camera.offset().distance(expected) < 1e-3);
        for _ in 0..500 {
            camera.follow(target);
        }
        assert!(camera.offset().distance(Vec2::new(-1460.0, -1040.0)) < 1e-2);

        // Near the corner the viewport stays inside the world.
        let corner = camera.target_offset(Vec2::new(10.0, 3990.0));
        assert_eq!(corner, Vec2::new(0.0, -(4000.0 - 1920.0)));
    }

    #[test]
    fn test_unclamped_camera_centres() {
        let config = CameraConfig {
            clamp_to_world: false,
            ..Default::default()
        };
        let mut camera = Camera::new(1000, (200.0, 100.0), &config);
        camera.snap_to(Vec2::new(10.0, 10.0));
        assert_eq!(camera.world_to_screen(Vec2::new(10.0, 10.0)), Vec2::new(100.0, 50.0));
    }
}
