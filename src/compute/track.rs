//! Procedural closed-loop track synthesis.
//!
//! A track is built from a seed in four stages: control points on a jittered
//! circle, a periodic cubic spline through them, a rasterized drivable stroke
//! along the dense centerline, and progress gates sampled from the same
//! centerline. Construction fails fast with a [`GeometryError`] instead of
//! producing an untraversable layout.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::geometry::{Vec2, segments_cross};
use super::raster::{DrivableMask, Surface, VisualLayer};
use super::spline::PeriodicSpline;
use crate::schema::{SimulationConfig, SurfaceKind, Theme, TrackConfig};

/// Arc length between consecutive stamps of the drivable stroke.
const STROKE_SPACING: f32 = 12.0;

/// Enclosed off-track regions up to this size are stroke artifacts and get
/// filled in. Anything larger is a real pocket of grass.
const MAX_HOLE_CELLS: usize = 16;

/// Every Nth centerline sample is kept for the self-crossing check.
const CROSSING_DECIMATION: usize = 10;

/// Cosmetic brush: every Nth centerline sample is stamped.
const BRUSH_STRIDE: usize = 5;
const KERB_RADIUS: f32 = 260.0;
const ROAD_RADIUS: f32 = 230.0;
/// Kerb colour alternates in runs of `KERB_RUN` brush points.
const KERB_RUN: usize = 2;
/// Center-line dashes: `DASH_LENGTH` samples long, starting every `DASH_PERIOD`.
const DASH_LENGTH: usize = 20;
const DASH_PERIOD: usize = 40;
const DASH_WIDTH: f32 = 4.0;

/// Track construction failures.
#[derive(Debug, thiserror::Error)]
pub enum GeometryError {
    #[error("A closed spline needs at least 3 control points, got {0}")]
    TooFewControlPoints(usize),
    #[error("Control points {0} and {1} coincide")]
    CoincidentControlPoints(usize, usize),
    #[error("Spline system is singular")]
    SingularSystem,
    #[error("Centerline sample {0} is not finite")]
    NonFinite(usize),
    #[error("Centerline sample {index} at ({x:.1}, {y:.1}) lies outside the world")]
    OutsideWorld { index: usize, x: f32, y: f32 },
    #[error("Centerline crosses itself between segments {0} and {1}")]
    SelfIntersecting(usize, usize),
    #[error("Drivable region has {0} components, expected 1")]
    Disconnected(usize),
    #[error("Drivable region does not enclose the infield")]
    NoInfield,
    #[error("Off-track area has {0} regions, expected the outside and the infield")]
    StrayOffTrack(usize),
}

/// Position and heading (degrees).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec2,
    pub heading: f32,
}

/// Immutable track shared by every vehicle of an episode.
#[derive(Debug, Clone)]
pub struct Track {
    pub seed: u64,
    /// Dense closed centerline, first point not repeated.
    pub centerline: Vec<Vec2>,
    /// Collision surface.
    pub mask: DrivableMask,
    /// Progress gates in driving order; index wraps.
    pub gates: Vec<Vec2>,
    pub start: Pose,
}

impl Track {
    /// Side length of the world the track lives in.
    pub fn world_size(&self) -> usize {
        self.mask.size()
    }

    #[inline]
    pub fn surface_at(&self, point: Vec2) -> Surface {
        self.mask.query(point)
    }

    /// Paint the cosmetic layer: background, alternating kerbs, road and a
    /// dashed center line. Physics never reads the result.
    pub fn paint(&self) -> VisualLayer {
        let mut layer = VisualLayer::new(self.world_size());
        let brush: Vec<Vec2> = self.centerline.iter().step_by(BRUSH_STRIDE).copied().collect();

        for (i, &p) in brush.iter().enumerate() {
            let kind = if i % (2 * KERB_RUN) < KERB_RUN {
                SurfaceKind::KerbA
            } else {
                SurfaceKind::KerbB
            };
            layer.paint_disk(p, KERB_RADIUS, kind);
        }
        for &p in &brush {
            layer.paint_disk(p, ROAD_RADIUS, SurfaceKind::Road);
        }

        let n = self.centerline.len();
        for start in (0..n).step_by(DASH_PERIOD) {
            let end = (start + DASH_LENGTH).min(n - 1);
            if end > start + 1 {
                layer.paint_polyline(
                    &self.centerline[start..end],
                    DASH_WIDTH,
                    SurfaceKind::CenterLine,
                );
            }
        }
        layer
    }

    /// Paint and colour the cosmetic layer in one go.
    pub fn render_rgb(&self, theme: &Theme) -> Vec<[u8; 3]> {
        self.paint().to_rgb(theme)
    }
}

/// Builds validated tracks from seeds.
#[derive(Debug, Clone)]
pub struct TrackBuilder {
    world_size: usize,
    config: TrackConfig,
}

impl TrackBuilder {
    pub fn new(config: &SimulationConfig) -> Self {
        Self::with_track(config.world.size, config.track.clone())
    }

    /// Builder for an explicit world size and track configuration, as
    /// stored in a capture header.
    pub fn with_track(world_size: usize, config: TrackConfig) -> Self {
        Self { world_size, config }
    }

    /// Control points at evenly spaced angles with seeded radii.
    pub fn control_points(&self, seed: u64) -> Vec<Vec2> {
        let mut rng = StdRng::seed_from_u64(seed);
        let n = self.config.control_points;
        let half = self.world_size as f32 / 2.0;
        let (r_min, r_max) = self.config.radius_band;
        (0..n)
            .map(|i| {
                let angle = i as f32 / n as f32 * std::f32::consts::TAU;
                let radius = if r_max > r_min {
                    rng.gen_range(r_min..r_max)
                } else {
                    r_min
                };
                Vec2::new(half + radius * angle.cos(), half + radius * angle.sin())
            })
            .collect()
    }

    /// Build and validate the track for `seed`.
    pub fn build(&self, seed: u64) -> Result<Track, GeometryError> {
        let controls = self.control_points(seed);
        let spline = PeriodicSpline::fit(&controls)?;
        let centerline = spline.sample(self.config.samples);
        self.check_centerline(&centerline)?;

        let mut mask = DrivableMask::new(self.world_size);
        mask.stroke_closed(&centerline, self.config.road_width / 2.0, STROKE_SPACING);

        let components = mask.component_count(true);
        if components != 1 {
            return Err(GeometryError::Disconnected(components));
        }
        let half = self.world_size as f32 / 2.0;
        if !mask.encloses(Vec2::new(half, half)) {
            return Err(GeometryError::NoInfield);
        }
        let filled = mask.fill_small_holes(MAX_HOLE_CELLS);
        if filled > 0 {
            log::debug!("Filled {} pinholes in track seed={}", filled, seed);
        }
        let regions = mask.component_count(false);
        if regions != 2 {
            return Err(GeometryError::StrayOffTrack(regions));
        }

        let gates: Vec<Vec2> = centerline
            .iter()
            .step_by(self.config.gate_stride)
            .copied()
            .collect();

        let origin = centerline[0];
        let ahead = centerline[self.config.heading_lookahead % centerline.len()];
        let start = Pose {
            position: origin,
            heading: (ahead - origin).angle().to_degrees(),
        };

        log::debug!(
            "Built track seed={} samples={} gates={} drivable_cells={}",
            seed,
            centerline.len(),
            gates.len(),
            mask.drivable_count()
        );

        Ok(Track {
            seed,
            centerline,
            mask,
            gates,
            start,
        })
    }

    fn check_centerline(&self, centerline: &[Vec2]) -> Result<(), GeometryError> {
        let size = self.world_size as f32;
        for (index, p) in centerline.iter().enumerate() {
            if !p.is_finite() {
                return Err(GeometryError::NonFinite(index));
            }
            if p.x < 0.0 || p.y < 0.0 || p.x >= size || p.y >= size {
                return Err(GeometryError::OutsideWorld {
                    index,
                    x: p.x,
                    y: p.y,
                });
            }
        }

        let coarse: Vec<Vec2> = centerline
            .iter()
            .step_by(CROSSING_DECIMATION)
            .copied()
            .collect();
        let m = coarse.len();
        for i in 0..m {
            let (a0, a1) = (coarse[i], coarse[(i + 1) % m]);
            // Skip the neighbours that share an endpoint with segment i.
            for j in i + 2..m {
                if i == 0 && j == m - 1 {
                    continue;
                }
                let (b0, b1) = (coarse[j], coarse[(j + 1) % m]);
                if segments_cross(a0, a1, b0, b1) {
                    return Err(GeometryError::SelfIntersecting(i, j));
                }
            }
        }
        Ok(())
    }
}
