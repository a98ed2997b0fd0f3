//! Per-tick view of an episode handed to renderers and recorders.

use std::io;

use crate::compute::{SkidLayer, Track, Vec2, Vehicle, VisualLayer};
use crate::schema::{Rgb, Theme};

/// Borrowed state of one episode tick.
///
/// Snapshots are read-only: nothing a sink does can influence the episode.
#[derive(Debug, Clone, Copy)]
pub struct FrameSnapshot<'a> {
    pub cycle: usize,
    /// Ticks simulated so far, starting at 1.
    pub tick: usize,
    pub track: &'a Track,
    /// Skid marks, present whenever a sink is attached.
    pub skid: Option<&'a SkidLayer>,
    pub vehicles: &'a [Vehicle],
    /// World-to-screen offset of the smoothed camera.
    pub camera_offset: Vec2,
    pub leader: Option<usize>,
}

impl FrameSnapshot<'_> {
    /// Number of vehicles still alive.
    pub fn alive_count(&self) -> usize {
        self.vehicles.iter().filter(|v| v.is_alive()).count()
    }

    /// Trail colour of vehicle `index`.
    pub fn trail_color(&self, index: usize, theme: &Theme) -> Rgb {
        if self.leader == Some(index) {
            theme.leader_trail
        } else {
            theme.trail
        }
    }

    /// Colour the painted track and blend the current skid marks over it.
    ///
    /// `background` must come from [`Track::paint`] of the same track.
    pub fn compose_background(&self, background: &VisualLayer, theme: &Theme) -> Vec<Rgb> {
        let mut pixels = background.to_rgb(theme);
        if let Some(skid) = self.skid {
            let size = skid.size().min(background.size());
            for y in 0..size {
                for x in 0..size {
                    let intensity = skid.get(x, y);
                    if intensity > 0 {
                        let i = y * background.size() + x;
                        pixels[i] = theme.with_skid(pixels[i], intensity);
                    }
                }
            }
        }
        pixels
    }
}

/// Receiver of episode frames.
pub trait FrameSink {
    fn on_frame(&mut self, frame: &FrameSnapshot<'_>) -> io::Result<()>;
}

impl<S: FrameSink + ?Sized> FrameSink for &mut S {
    fn on_frame(&mut self, frame: &FrameSnapshot<'_>) -> io::Result<()> {
        (**self).on_frame(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::{TrackBuilder, small_config};

    #[test]
    fn test_trail_color_and_alive_count() {
        let config = small_config();
        let track = TrackBuilder::new(&config).build(4).unwrap();
        let vehicles = vec![Vehicle::new(track.start, 0), Vehicle::new(track.start, 1)];
        let frame = FrameSnapshot {
            cycle: 0,
            tick: 1,
            track: &track,
            skid: None,
            vehicles: &vehicles,
            camera_offset: Vec2::ZERO,
            leader: Some(1),
        };
        let theme = Theme::pro();
        assert_eq!(frame.trail_color(1, &theme), theme.leader_trail);
        assert_eq!(frame.trail_color(0, &theme), theme.trail);
        assert_eq!(frame.alive_count(), 2);
    }

    #[test]
    fn test_compose_background_blends_skid() {
        let config = small_config();
        let track = TrackBuilder::new(&config).build(4).unwrap();
        let skid = SkidLayer::new(track.world_size());
        let p = track.start.position;
        skid.stamp(p, 3.0, 255);

        let frame = FrameSnapshot {
            cycle: 0,
            tick: 1,
            track: &track,
            skid: Some(&skid),
            vehicles: &[],
            camera_offset: Vec2::ZERO,
            leader: None,
        };
        let theme = Theme::pro();
        let painted = track.paint();
        let pixels = frame.compose_background(&painted, &theme);
        let (x, y) = p.floor();
        let i = y as usize * track.world_size() + x as usize;
        assert_eq!(pixels[i], theme.skid);
        assert_eq!(pixels[0], theme.background);
    }
}
