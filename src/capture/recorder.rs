//! Capture recorder writing episode frames to an `.rcap` file.

use std::fs::{self, File};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::format::{
    CaptureFlags, CaptureHeader, CapturedFrame, CompressionType, FrameIndex, compress_lz4,
};
use super::snapshot::{FrameSink, FrameSnapshot};
use crate::schema::{CaptureConfig, SimulationConfig};

/// Configuration for capture recording.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Compression type to use.
    pub compression: CompressionType,
    /// Record every Nth emitted frame (1 = every frame).
    pub frame_skip: u32,
    /// Maximum frames to record (0 = unlimited).
    pub max_frames: u64,
    /// Whether the recorded episode is a showcase run.
    pub showcase: bool,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            compression: CompressionType::None,
            frame_skip: 1,
            max_frames: 0,
            showcase: false,
        }
    }
}

impl RecorderConfig {
    /// Recorder settings from the run's capture configuration.
    ///
    /// Compression falls back to none when the `lz4` feature is disabled.
    pub fn from_capture(config: &CaptureConfig, showcase: bool) -> Self {
        let compression = if config.compress && cfg!(feature = "lz4") {
            CompressionType::Lz4
        } else {
            if config.compress {
                log::warn!("Capture compression requested but the lz4 feature is disabled");
            }
            CompressionType::None
        };
        Self {
            compression,
            frame_skip: config.frame_skip.max(1),
            max_frames: config.max_frames.unwrap_or(0),
            showcase,
        }
    }
}

/// Path of the capture file for `cycle` inside `directory`.
pub fn capture_path<P: AsRef<Path>>(directory: P, cycle: usize) -> PathBuf {
    directory.as_ref().join(format!("cycle_{cycle:05}.rcap"))
}

/// Records episode frames to a file.
///
/// Usage:
/// ```ignore
/// let mut recorder = CaptureRecorder::new(&path, &sim, track.seed, cycle, 40, Default::default())?;
/// evaluator.evaluate(mode, cycle, &mut entrants, Some(&mut recorder))?;
/// let stats = recorder.finalize()?;
/// ```
pub struct CaptureRecorder {
    writer: BufWriter<File>,
    header: CaptureHeader,
    frame_indices: Vec<FrameIndex>,
    config: RecorderConfig,
    frames_written: u64,
    step_counter: u32,
    header_len: u64,
    /// Position in the skid change log up to which marks were stored.
    skid_cursor: usize,
}

impl CaptureRecorder {
    /// Create the file and write a placeholder header.
    pub fn new<P: AsRef<Path>>(
        path: P,
        sim_config: &SimulationConfig,
        track_seed: u64,
        cycle: usize,
        vehicle_count: usize,
        config: RecorderConfig,
    ) -> io::Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        let header = CaptureHeader {
            flags: CaptureFlags {
                compression: config.compression,
                showcase: config.showcase,
            },
            world_size: sim_config.world.size as u32,
            viewport: sim_config.world.viewport,
            vehicle_count: vehicle_count as u32,
            track_seed,
            cycle: cycle as u64,
            frame_count: 0, // Updated on finalize
            track: sim_config.track.clone(),
        };
        header.write_to(&mut writer)?;
        let header_len = header.encoded_len()? as u64;

        Ok(Self {
            writer,
            header,
            frame_indices: Vec::new(),
            config,
            frames_written: 0,
            step_counter: 0,
            header_len,
            skid_cursor: 0,
        })
    }

    /// Record a frame.
    ///
    /// Returns true if the frame was written (frames may be skipped per config).
    pub fn record_frame(&mut self, frame: &FrameSnapshot<'_>) -> io::Result<bool> {
        if frame.vehicles.len() != self.header.vehicle_count as usize {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "Frame has {} vehicles, capture expects {}",
                    frame.vehicles.len(),
                    self.header.vehicle_count
                ),
            ));
        }

        self.step_counter += 1;
        if self.step_counter < self.config.frame_skip {
            return Ok(false);
        }
        self.step_counter = 0;

        if self.config.max_frames > 0 && self.frames_written >= self.config.max_frames {
            return Ok(false);
        }

        let offset = self.writer.stream_position()?;
        let mut captured = CapturedFrame::from_snapshot(frame);
        if let Some(skid) = frame.skid {
            captured.skid_marks = skid.changes_since(self.skid_cursor);
            self.skid_cursor += captured.skid_marks.len();
        }
        let raw = captured.encode();
        let data = match self.header.flags.compression {
            CompressionType::None => raw,
            CompressionType::Lz4 => compress_lz4(&raw),
        };

        self.writer.write_all(&data)?;
        self.frame_indices.push(FrameIndex {
            offset,
            size: data.len() as u64,
        });
        self.frames_written += 1;
        Ok(true)
    }

    /// Write the frame index table and patch the header's frame count.
    pub fn finalize(mut self) -> io::Result<CaptureStats> {
        let index_offset = self.writer.stream_position()?;
        for index in &self.frame_indices {
            index.write_to(&mut self.writer)?;
        }

        self.header.frame_count = self.frames_written;
        self.writer.seek(SeekFrom::Start(0))?;
        self.header.write_to(&mut self.writer)?;
        self.writer.flush()?;

        let total_bytes = index_offset + self.frame_indices.len() as u64 * FrameIndex::SIZE as u64;
        let payload = index_offset.saturating_sub(self.header_len);

        Ok(CaptureStats {
            cycle: self.header.cycle,
            frame_count: self.frames_written,
            total_bytes,
            average_frame_size: if self.frames_written > 0 {
                payload / self.frames_written
            } else {
                0
            },
            compression: self.header.flags.compression,
        })
    }

    /// Get number of frames recorded so far.
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl FrameSink for CaptureRecorder {
    fn on_frame(&mut self, frame: &FrameSnapshot<'_>) -> io::Result<()> {
        self.record_frame(frame).map(|_| ())
    }
}

/// Statistics from a recording session.
#[derive(Debug, Clone)]
pub struct CaptureStats {
    pub cycle: u64,
    /// Total frames recorded.
    pub frame_count: u64,
    /// Total file size in bytes.
    pub total_bytes: u64,
    /// Average stored frame size.
    pub average_frame_size: u64,
    /// Compression used.
    pub compression: CompressionType,
}

impl std::fmt::Display for CaptureStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "cycle {}: {} frames, {} bytes total, {} bytes/frame avg ({:?} compression)",
            self.cycle,
            self.frame_count,
            self.total_bytes,
            self.average_frame_size,
            self.compression
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CapturePlayer;
    use crate::compute::{SkidLayer, Track, TrackBuilder, Vec2, Vehicle, small_config};
    use tempfile::tempdir;

    fn track() -> Track {
        TrackBuilder::new(&small_config()).build(8).unwrap()
    }

    fn record(recorder: &mut CaptureRecorder, track: &Track, vehicles: &[Vehicle], ticks: usize) {
        for tick in 1..=ticks {
            let frame = FrameSnapshot {
                cycle: 3,
                tick,
                track,
                skid: None,
                vehicles,
                camera_offset: Vec2::ZERO,
                leader: Some(0),
            };
            recorder.on_frame(&frame).unwrap();
        }
    }

    #[test]
    fn test_capture_path() {
        assert_eq!(
            capture_path("clips", 12),
            Path::new("clips").join("cycle_00012.rcap")
        );
    }

    #[test]
    fn test_recorder_basic() {
        let dir = tempdir().unwrap();
        let path = capture_path(dir.path().join("nested"), 3);
        let track = track();
        let vehicles = vec![Vehicle::new(track.start, 0); 3];

        let mut recorder = CaptureRecorder::new(
            &path,
            &small_config(),
            track.seed,
            3,
            3,
            RecorderConfig::default(),
        )
        .unwrap();
        record(&mut recorder, &track, &vehicles, 10);
        assert_eq!(recorder.frames_written(), 10);

        let stats = recorder.finalize().unwrap();
        assert_eq!(stats.frame_count, 10);
        assert!(path.exists());
        assert_eq!(fs::metadata(&path).unwrap().len(), stats.total_bytes);
        assert!(stats.to_string().starts_with("cycle 3: 10 frames"));
    }

    #[test]
    fn test_recorder_frame_skip() {
        let dir = tempdir().unwrap();
        let track = track();
        let vehicles = vec![Vehicle::new(track.start, 0)];
        let config = RecorderConfig {
            frame_skip: 5,
            ..Default::default()
        };
        let mut recorder = CaptureRecorder::new(
            dir.path().join("skip.rcap"),
            &small_config(),
            track.seed,
            0,
            1,
            config,
        )
        .unwrap();

        // 20 frames, written at 5, 10, 15, 20
        record(&mut recorder, &track, &vehicles, 20);
        assert_eq!(recorder.finalize().unwrap().frame_count, 4);
    }

    #[test]
    fn test_recorder_max_frames() {
        let dir = tempdir().unwrap();
        let track = track();
        let vehicles = vec![Vehicle::new(track.start, 0)];
        let config = RecorderConfig {
            max_frames: 5,
            ..Default::default()
        };
        let mut recorder = CaptureRecorder::new(
            dir.path().join("max.rcap"),
            &small_config(),
            track.seed,
            0,
            1,
            config,
        )
        .unwrap();

        record(&mut recorder, &track, &vehicles, 100);
        assert_eq!(recorder.finalize().unwrap().frame_count, 5);
    }

    #[test]
    fn test_vehicle_count_mismatch_is_error() {
        let dir = tempdir().unwrap();
        let track = track();
        let vehicles = vec![Vehicle::new(track.start, 0); 2];
        let mut recorder = CaptureRecorder::new(
            dir.path().join("bad.rcap"),
            &small_config(),
            track.seed,
            0,
            5,
            RecorderConfig::default(),
        )
        .unwrap();
        let frame = FrameSnapshot {
            cycle: 0,
            tick: 1,
            track: &track,
            skid: None,
            vehicles: &vehicles,
            camera_offset: Vec2::ZERO,
            leader: None,
        };
        let err = recorder.on_frame(&frame).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_skid_changes_stored_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("skid.rcap");
        let track = track();
        let vehicles = vec![Vehicle::new(track.start, 0)];
        let skid = SkidLayer::new(track.world_size());
        let config = RecorderConfig {
            frame_skip: 2,
            ..Default::default()
        };
        let mut recorder =
            CaptureRecorder::new(&path, &small_config(), track.seed, 0, 1, config).unwrap();

        let centers = [Vec2::new(100.0, 100.0), Vec2::new(200.0, 150.0), Vec2::new(300.0, 90.0)];
        for (tick, center) in centers.iter().enumerate() {
            skid.stamp(*center, 3.0, 120);
            let frame = FrameSnapshot {
                cycle: 0,
                tick: tick + 1,
                track: &track,
                skid: Some(&skid),
                vehicles: &vehicles,
                camera_offset: Vec2::ZERO,
                leader: None,
            };
            recorder.on_frame(&frame).unwrap();
        }
        // Only the frame at tick 2 is stored; it carries the first two stamps.
        recorder.finalize().unwrap();

        let mut player = CapturePlayer::open(&path).unwrap();
        assert_eq!(player.frame_count(), 1);
        let frame = player.read_frame(0).unwrap();
        assert_eq!(frame.tick, 2);
        let stamped_before_write = skid.changes_since(0).len()
            - skid.changes_since(0).iter().filter(|m| m.x >= 290).count();
        assert_eq!(frame.skid_marks.len(), stamped_before_write);
        assert!(frame.skid_marks.iter().all(|m| m.x < 290));
    }

    #[test]
    fn test_config_from_capture() {
        let capture = CaptureConfig {
            frame_skip: 2,
            max_frames: Some(100),
            ..Default::default()
        };
        let config = RecorderConfig::from_capture(&capture, true);
        assert_eq!(config.frame_skip, 2);
        assert_eq!(config.max_frames, 100);
        assert!(config.showcase);
        assert_eq!(config.compression, CompressionType::None);
    }
}
