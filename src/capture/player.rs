//! Capture player for reading recorded episodes back.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use super::format::{CaptureHeader, CapturedFrame, CompressionType, FrameIndex, decompress_lz4};
use crate::compute::{GeometryError, Track, TrackBuilder};

fn invalid(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

/// Reads `.rcap` files for an external renderer.
///
/// Usage:
/// ```ignore
/// let mut player = CapturePlayer::open("training_clips/cycle_00010.rcap")?;
/// let track = player.rebuild_track()?;
/// for frame in player.frames() {
///     let frame = frame?;
///     // apply frame.skid_marks, then draw frame.vehicles over the painted track...
/// }
/// ```
pub struct CapturePlayer {
    reader: BufReader<File>,
    header: CaptureHeader,
    frame_indices: Vec<FrameIndex>,
}

impl CapturePlayer {
    /// Open a capture file for playback.
    ///
    /// The index table is checked against the file before any frame is
    /// read: every entry must lie between the header and the table.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);

        let header = CaptureHeader::read_from(&mut reader)?;
        let frames_start = reader.stream_position()?;

        // The index table sits at the end of the file.
        let file_len = reader.seek(SeekFrom::End(0))?;
        let index_start = header
            .frame_count
            .checked_mul(FrameIndex::SIZE as u64)
            .and_then(|table_size| file_len.checked_sub(table_size))
            .filter(|&start| start >= frames_start)
            .ok_or_else(|| {
                invalid(format!(
                    "File of {} bytes cannot hold {} frames",
                    file_len, header.frame_count
                ))
            })?;
        reader.seek(SeekFrom::Start(index_start))?;

        let mut frame_indices = Vec::with_capacity(header.frame_count as usize);
        for i in 0..header.frame_count {
            let index = FrameIndex::read_from(&mut reader)?;
            let in_bounds = index.offset >= frames_start
                && index
                    .offset
                    .checked_add(index.size)
                    .is_some_and(|end| end <= index_start);
            if !in_bounds {
                return Err(invalid(format!(
                    "Frame {} at offset {} with {} bytes lies outside the frame data",
                    i, index.offset, index.size
                )));
            }
            frame_indices.push(index);
        }

        Ok(Self {
            reader,
            header,
            frame_indices,
        })
    }

    /// Rebuild the episode's track from the header.
    pub fn rebuild_track(&self) -> Result<Track, GeometryError> {
        TrackBuilder::with_track(self.header.world_size as usize, self.header.track.clone())
            .build(self.header.track_seed)
    }

    /// Get capture header.
    pub fn header(&self) -> &CaptureHeader {
        &self.header
    }

    /// Get total number of frames.
    pub fn frame_count(&self) -> u64 {
        self.header.frame_count
    }

    /// Read a specific frame by index.
    pub fn read_frame(&mut self, frame_index: u64) -> io::Result<CapturedFrame> {
        let index = *self
            .frame_indices
            .get(frame_index as usize)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "Frame index {} out of range ({} frames)",
                        frame_index, self.header.frame_count
                    ),
                )
            })?;

        self.reader.seek(SeekFrom::Start(index.offset))?;
        let mut data = vec![0u8; index.size as usize];
        self.reader.read_exact(&mut data)?;

        let raw = match self.header.flags.compression {
            CompressionType::None => data,
            CompressionType::Lz4 => decompress_lz4(&data)?,
        };
        let frame = CapturedFrame::decode(&raw)?;

        if frame.vehicles.len() != self.header.vehicle_count as usize {
            return Err(invalid(format!(
                "Frame {} has {} vehicles, header says {}",
                frame_index,
                frame.vehicles.len(),
                self.header.vehicle_count
            )));
        }
        Ok(frame)
    }

    /// Create an iterator over all frames.
    pub fn frames(&mut self) -> FrameIterator<'_> {
        FrameIterator {
            player: self,
            current: 0,
        }
    }
}

/// Iterator over captured frames.
pub struct FrameIterator<'a> {
    player: &'a mut CapturePlayer,
    current: u64,
}

impl Iterator for FrameIterator<'_> {
    type Item = io::Result<CapturedFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current >= self.player.frame_count() {
            return None;
        }

        let result = self.player.read_frame(self.current);
        self.current += 1;
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.player.frame_count() - self.current) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for FrameIterator<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureRecorder, FrameSink, FrameSnapshot, RecorderConfig};
    use crate::compute::{
        Command, Steer, TrackBuilder, Vec2, Vehicle, mark_leader, small_config,
    };
    use tempfile::tempdir;

    #[test]
    fn test_player_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("roundtrip.rcap");
        let config = small_config();
        let track = TrackBuilder::new(&config).build(9).unwrap();

        let mut vehicles: Vec<Vehicle> = (0..3).map(|i| Vehicle::new(track.start, i)).collect();
        let mut expected = Vec::new();
        {
            let mut recorder = CaptureRecorder::new(
                &path,
                &config,
                track.seed,
                7,
                vehicles.len(),
                RecorderConfig {
                    showcase: true,
                    ..Default::default()
                },
            )
            .unwrap();

            for tick in 1..=6 {
                for (i, v) in vehicles.iter_mut().enumerate() {
                    let steer = if i == 1 { Steer::Left } else { Steer::Straight };
                    v.apply(Command { steer, throttle: true });
                    v.update(&track.mask, None, &config.vehicle);
                }
                let leader = mark_leader(&mut vehicles);
                let frame = FrameSnapshot {
                    cycle: 7,
                    tick,
                    track: &track,
                    skid: None,
                    vehicles: &vehicles,
                    camera_offset: Vec2::new(-(tick as f32), 2.0),
                    leader,
                };
                expected.push(CapturedFrame::from_snapshot(&frame));
                recorder.on_frame(&frame).unwrap();
            }
            recorder.finalize().unwrap();
        }

        let mut player = CapturePlayer::open(&path).unwrap();
        let header = player.header().clone();
        assert_eq!(header.frame_count, 6);
        assert_eq!(header.vehicle_count, 3);
        assert_eq!(header.track_seed, track.seed);
        assert_eq!(header.cycle, 7);
        assert!(header.flags.showcase);
        assert_eq!(header.track, config.track);

        let frames: Vec<CapturedFrame> = player.frames().collect::<io::Result<_>>().unwrap();
        assert_eq!(frames, expected);
        assert_eq!(player.read_frame(2).unwrap(), expected[2]);
        assert!(frames[5].vehicles[0].speed > 0.0);
        assert_eq!(frames[5].vehicles[0].trail.len(), 3);
    }

    #[test]
    fn test_rebuild_track_from_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rebuild.rcap");
        // A layout no default configuration would produce.
        let mut config = small_config();
        config.track.road_width = 90.0;
        config.track.control_points = 12;
        let builder = TrackBuilder::new(&config);
        let track = (0..20)
            .find_map(|seed| builder.build(seed).ok())
            .expect("some seed builds");

        let recorder =
            CaptureRecorder::new(&path, &config, track.seed, 2, 1, RecorderConfig::default())
                .unwrap();
        recorder.finalize().unwrap();

        let player = CapturePlayer::open(&path).unwrap();
        let rebuilt = player.rebuild_track().unwrap();
        assert_eq!(rebuilt.seed, track.seed);
        assert_eq!(rebuilt.gates, track.gates);
        assert_eq!(rebuilt.start, track.start);
        assert_eq!(rebuilt.mask, track.mask);
    }

    #[test]
    fn test_out_of_range_frame() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.rcap");
        let config = small_config();
        let recorder =
            CaptureRecorder::new(&path, &config, 1, 0, 2, RecorderConfig::default()).unwrap();
        recorder.finalize().unwrap();

        let mut player = CapturePlayer::open(&path).unwrap();
        assert_eq!(player.frame_count(), 0);
        assert_eq!(player.frames().len(), 0);
        let err = player.read_frame(0).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    fn header(frame_count: u64) -> CaptureHeader {
        CaptureHeader {
            flags: Default::default(),
            world_size: 100,
            viewport: (10.0, 10.0),
            vehicle_count: 1,
            track_seed: 0,
            cycle: 0,
            frame_count,
            track: Default::default(),
        }
    }

    #[test]
    fn test_truncated_file_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("short.rcap");
        let mut bytes = Vec::new();
        header(1000).write_to(&mut bytes).unwrap();
        std::fs::write(&path, bytes).unwrap();
        assert!(CapturePlayer::open(&path).is_err());
    }

    #[test]
    fn test_overflowing_frame_count_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("overflow.rcap");
        let mut bytes = Vec::new();
        header(u64::MAX / 4).write_to(&mut bytes).unwrap();
        std::fs::write(&path, bytes).unwrap();
        let err = CapturePlayer::open(&path).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_index_outside_frame_data_rejected() {
        let dir = tempdir().unwrap();
        let mut bytes = Vec::new();
        header(1).write_to(&mut bytes).unwrap();
        let frames_start = bytes.len() as u64;
        bytes.extend_from_slice(&[0u8; 32]);

        let cases = [
            // Frame size larger than the file.
            FrameIndex {
                offset: frames_start,
                size: u64::MAX / 2,
            },
            // Offset plus size overflows.
            FrameIndex {
                offset: u64::MAX - 4,
                size: 16,
            },
            // Offset inside the header.
            FrameIndex { offset: 8, size: 4 },
        ];
        for (i, index) in cases.iter().enumerate() {
            let path = dir.path().join(format!("index_{i}.rcap"));
            let mut file = bytes.clone();
            index.write_to(&mut file).unwrap();
            std::fs::write(&path, file).unwrap();
            let err = CapturePlayer::open(&path).err().unwrap();
            assert_eq!(err.kind(), io::ErrorKind::InvalidData, "case {i}");
        }
    }
}
