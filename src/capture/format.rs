//! Binary format definitions for race capture files.

use std::io::{self, Read, Write};

use super::snapshot::FrameSnapshot;
use crate::compute::{SkidMark, SmokeParticle, Vec2};
use crate::schema::TrackConfig;

/// Magic bytes identifying a race capture file.
pub const CAPTURE_MAGIC: &[u8; 4] = b"RCAP";

/// Current format version.
pub const CAPTURE_VERSION: u16 = 2;

/// Compression type for frame data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum CompressionType {
    /// No compression.
    #[default]
    None = 0,
    /// LZ4 fast compression.
    Lz4 = 1,
}

impl CompressionType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(CompressionType::None),
            1 => Some(CompressionType::Lz4),
            _ => None,
        }
    }
}

/// Capture file header flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureFlags {
    /// Compression type (lower 4 bits).
    pub compression: CompressionType,
    /// Set when the episode ran under the long showcase budget.
    pub showcase: bool,
}

impl CaptureFlags {
    pub fn to_u16(self) -> u16 {
        let mut flags = self.compression as u16;
        if self.showcase {
            flags |= 1 << 4;
        }
        flags
    }

    pub fn from_u16(v: u16) -> Self {
        Self {
            compression: CompressionType::from_u8((v & 0x0F) as u8).unwrap_or_default(),
            showcase: (v & (1 << 4)) != 0,
        }
    }
}

/// File header.
///
/// The fixed fields are followed by the JSON-encoded [`TrackConfig`], so a
/// player can rebuild the exact track (`track_seed` under that config)
/// without the run's configuration file.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureHeader {
    pub flags: CaptureFlags,
    /// World side length.
    pub world_size: u32,
    /// Viewport width and height.
    pub viewport: (f32, f32),
    /// Vehicles in every frame.
    pub vehicle_count: u32,
    pub track_seed: u64,
    pub cycle: u64,
    /// Total number of frames, patched in on finalize.
    pub frame_count: u64,
    /// Track generator settings the episode ran with.
    pub track: TrackConfig,
}

impl CaptureHeader {
    /// Size of the fixed part in bytes.
    /// Magic(4) + Version(2) + Flags(2) + WorldSize(4) + Viewport(8) +
    /// VehicleCount(4) + TrackSeed(8) + Cycle(8) + FrameCount(8) + Reserved(8) = 56
    pub const FIXED_SIZE: usize = 56;

    /// Upper bound on the encoded track configuration.
    pub const MAX_TRACK_JSON: usize = 64 * 1024;

    /// Encoded size of this header, track configuration included.
    pub fn encoded_len(&self) -> io::Result<usize> {
        Ok(Self::FIXED_SIZE + 4 + self.track_json()?.len())
    }

    fn track_json(&self) -> io::Result<Vec<u8>> {
        serde_json::to_vec(&self.track)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
    }

    /// Write header to output.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let track = self.track_json()?;
        w.write_all(CAPTURE_MAGIC)?;
        w.write_all(&CAPTURE_VERSION.to_le_bytes())?;
        w.write_all(&self.flags.to_u16().to_le_bytes())?;
        w.write_all(&self.world_size.to_le_bytes())?;
        w.write_all(&self.viewport.0.to_le_bytes())?;
        w.write_all(&self.viewport.1.to_le_bytes())?;
        w.write_all(&self.vehicle_count.to_le_bytes())?;
        w.write_all(&self.track_seed.to_le_bytes())?;
        w.write_all(&self.cycle.to_le_bytes())?;
        w.write_all(&self.frame_count.to_le_bytes())?;
        // Reserved bytes
        w.write_all(&[0u8; 8])?;
        w.write_all(&(track.len() as u32).to_le_bytes())?;
        w.write_all(&track)?;
        Ok(())
    }

    /// Read header from input.
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if &magic != CAPTURE_MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Invalid RCAP magic bytes",
            ));
        }

        let version = u16::from_le_bytes(read_array(r)?);
        if version != CAPTURE_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unsupported RCAP version: {}", version),
            ));
        }

        let flags = CaptureFlags::from_u16(u16::from_le_bytes(read_array(r)?));
        let world_size = u32::from_le_bytes(read_array(r)?);
        let viewport = (
            f32::from_le_bytes(read_array(r)?),
            f32::from_le_bytes(read_array(r)?),
        );
        let vehicle_count = u32::from_le_bytes(read_array(r)?);
        let track_seed = u64::from_le_bytes(read_array(r)?);
        let cycle = u64::from_le_bytes(read_array(r)?);
        let frame_count = u64::from_le_bytes(read_array(r)?);

        // Skip reserved bytes
        let _reserved: [u8; 8] = read_array(r)?;

        let track_len = u32::from_le_bytes(read_array(r)?) as usize;
        if track_len > Self::MAX_TRACK_JSON {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Track configuration too large: {} bytes", track_len),
            ));
        }
        let mut track_json = vec![0u8; track_len];
        r.read_exact(&mut track_json)?;
        let track = serde_json::from_slice(&track_json)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        Ok(Self {
            flags,
            world_size,
            viewport,
            vehicle_count,
            track_seed,
            cycle,
            frame_count,
            track,
        })
    }
}

fn read_array<R: Read, const N: usize>(r: &mut R) -> io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// Index entry for a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameIndex {
    /// Byte offset from start of file.
    pub offset: u64,
    /// Stored size in bytes (compressed size when compression is on).
    pub size: u64,
}

impl FrameIndex {
    /// Size of one index entry in bytes.
    pub const SIZE: usize = 16;

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.offset.to_le_bytes())?;
        w.write_all(&self.size.to_le_bytes())?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let offset = u64::from_le_bytes(read_array(r)?);
        let size = u64::from_le_bytes(read_array(r)?);
        Ok(Self { offset, size })
    }
}

/// State of one vehicle in a captured frame.
#[derive(Debug, Clone, PartialEq)]
pub struct VehiclePose {
    pub position: Vec2,
    /// Degrees.
    pub heading: f32,
    pub speed: f32,
    pub gates_passed: u32,
    pub alive: bool,
    pub leader: bool,
    /// Trail points, oldest first.
    pub trail: Vec<Vec2>,
    pub smoke: Vec<SmokeParticle>,
}

impl VehiclePose {
    /// x(4) + y(4) + heading(4) + speed(4) + gates(4) + flags(1)
    pub const SIZE: usize = 21;
    /// x(4) + y(4)
    const TRAIL_POINT_SIZE: usize = 8;
    /// x(4) + y(4) + size(4) + life(4)
    const SMOKE_SIZE: usize = 16;

    fn encode_into(&self, bytes: &mut Vec<u8>) {
        bytes.extend_from_slice(&self.position.x.to_le_bytes());
        bytes.extend_from_slice(&self.position.y.to_le_bytes());
        bytes.extend_from_slice(&self.heading.to_le_bytes());
        bytes.extend_from_slice(&self.speed.to_le_bytes());
        bytes.extend_from_slice(&self.gates_passed.to_le_bytes());
        bytes.push(self.alive as u8 | (self.leader as u8) << 1);

        let trail = &self.trail[self.trail.len().saturating_sub(u16::MAX as usize)..];
        bytes.extend_from_slice(&(trail.len() as u16).to_le_bytes());
        for p in trail {
            bytes.extend_from_slice(&p.x.to_le_bytes());
            bytes.extend_from_slice(&p.y.to_le_bytes());
        }

        let smoke = &self.smoke[..self.smoke.len().min(u16::MAX as usize)];
        bytes.extend_from_slice(&(smoke.len() as u16).to_le_bytes());
        for p in smoke {
            bytes.extend_from_slice(&p.position.x.to_le_bytes());
            bytes.extend_from_slice(&p.position.y.to_le_bytes());
            bytes.extend_from_slice(&p.size.to_le_bytes());
            bytes.extend_from_slice(&p.life.to_le_bytes());
        }
    }

    fn decode_from(r: &mut &[u8]) -> io::Result<Self> {
        ensure_remaining(r, Self::SIZE + 2, "vehicle")?;
        let x = f32::from_le_bytes(read_array(r)?);
        let y = f32::from_le_bytes(read_array(r)?);
        let heading = f32::from_le_bytes(read_array(r)?);
        let speed = f32::from_le_bytes(read_array(r)?);
        let gates_passed = u32::from_le_bytes(read_array(r)?);
        let [flags] = read_array::<_, 1>(r)?;

        let trail_count = u16::from_le_bytes(read_array(r)?) as usize;
        ensure_remaining(r, trail_count * Self::TRAIL_POINT_SIZE + 2, "trail")?;
        let mut trail = Vec::with_capacity(trail_count);
        for _ in 0..trail_count {
            trail.push(Vec2::new(
                f32::from_le_bytes(read_array(r)?),
                f32::from_le_bytes(read_array(r)?),
            ));
        }

        let smoke_count = u16::from_le_bytes(read_array(r)?) as usize;
        ensure_remaining(r, smoke_count * Self::SMOKE_SIZE, "smoke")?;
        let mut smoke = Vec::with_capacity(smoke_count);
        for _ in 0..smoke_count {
            let position = Vec2::new(
                f32::from_le_bytes(read_array(r)?),
                f32::from_le_bytes(read_array(r)?),
            );
            let size = f32::from_le_bytes(read_array(r)?);
            let life = u32::from_le_bytes(read_array(r)?);
            smoke.push(SmokeParticle {
                position,
                life,
                size,
            });
        }

        Ok(Self {
            position: Vec2::new(x, y),
            heading,
            speed,
            gates_passed,
            alive: flags & 1 != 0,
            leader: flags & 2 != 0,
            trail,
            smoke,
        })
    }
}

fn ensure_remaining(r: &[u8], needed: usize, what: &str) -> io::Result<()> {
    if r.len() < needed {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Frame truncated in {}: {} of {} bytes", what, r.len(), needed),
        ));
    }
    Ok(())
}

/// One decoded frame.
///
/// `skid_marks` holds the skid cells raised since the previously stored
/// frame; replaying them in order with `max` rebuilds the skid layer.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedFrame {
    pub tick: u32,
    pub leader: Option<u32>,
    pub camera_offset: Vec2,
    pub vehicles: Vec<VehiclePose>,
    pub skid_marks: Vec<SkidMark>,
}

impl CapturedFrame {
    /// tick(4) + leader(4) + camera(8) + count(4)
    const FIXED_SIZE: usize = 20;
    /// x(4) + y(4) + intensity(1)
    const SKID_MARK_SIZE: usize = 9;
    const NO_LEADER: u32 = u32::MAX;

    /// Extract the recorded fields of a snapshot.
    ///
    /// Skid marks are left empty; the recorder fills them from the layer's
    /// change log.
    pub fn from_snapshot(frame: &FrameSnapshot<'_>) -> Self {
        Self {
            tick: frame.tick as u32,
            leader: frame.leader.map(|l| l as u32),
            camera_offset: frame.camera_offset,
            vehicles: frame
                .vehicles
                .iter()
                .enumerate()
                .map(|(i, v)| VehiclePose {
                    position: v.position,
                    heading: v.heading,
                    speed: v.speed(),
                    gates_passed: v.gates_passed,
                    alive: v.is_alive(),
                    leader: frame.leader == Some(i),
                    trail: v.trail.iter().copied().collect(),
                    smoke: v.smoke.clone(),
                })
                .collect(),
            skid_marks: Vec::new(),
        }
    }

    /// Encode to little-endian bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(
            Self::FIXED_SIZE
                + self.vehicles.len() * (VehiclePose::SIZE + 4)
                + 4
                + self.skid_marks.len() * Self::SKID_MARK_SIZE,
        );
        bytes.extend_from_slice(&self.tick.to_le_bytes());
        bytes.extend_from_slice(&self.leader.unwrap_or(Self::NO_LEADER).to_le_bytes());
        bytes.extend_from_slice(&self.camera_offset.x.to_le_bytes());
        bytes.extend_from_slice(&self.camera_offset.y.to_le_bytes());
        bytes.extend_from_slice(&(self.vehicles.len() as u32).to_le_bytes());
        for v in &self.vehicles {
            v.encode_into(&mut bytes);
        }
        bytes.extend_from_slice(&(self.skid_marks.len() as u32).to_le_bytes());
        for mark in &self.skid_marks {
            bytes.extend_from_slice(&mark.x.to_le_bytes());
            bytes.extend_from_slice(&mark.y.to_le_bytes());
            bytes.push(mark.intensity);
        }
        bytes
    }

    /// Decode bytes produced by [`encode`](Self::encode).
    pub fn decode(mut bytes: &[u8]) -> io::Result<Self> {
        if bytes.len() < Self::FIXED_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Frame too short: {} bytes", bytes.len()),
            ));
        }
        let r = &mut bytes;
        let tick = u32::from_le_bytes(read_array(r)?);
        let leader = u32::from_le_bytes(read_array(r)?);
        let camera_offset = Vec2::new(
            f32::from_le_bytes(read_array(r)?),
            f32::from_le_bytes(read_array(r)?),
        );
        let count = u32::from_le_bytes(read_array(r)?) as usize;
        // Each vehicle takes at least its pose and two empty counts.
        ensure_remaining(r, count.saturating_mul(VehiclePose::SIZE + 4), "vehicles")?;

        let mut vehicles = Vec::with_capacity(count);
        for _ in 0..count {
            vehicles.push(VehiclePose::decode_from(r)?);
        }

        ensure_remaining(r, 4, "skid marks")?;
        let mark_count = u32::from_le_bytes(read_array(r)?) as usize;
        if r.len() != mark_count.saturating_mul(Self::SKID_MARK_SIZE) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Frame size mismatch: {} bytes left for {} skid marks",
                    r.len(),
                    mark_count
                ),
            ));
        }
        let mut skid_marks = Vec::with_capacity(mark_count);
        for _ in 0..mark_count {
            let x = u32::from_le_bytes(read_array(r)?);
            let y = u32::from_le_bytes(read_array(r)?);
            let [intensity] = read_array::<_, 1>(r)?;
            skid_marks.push(SkidMark { x, y, intensity });
        }

        Ok(Self {
            tick,
            leader: (leader != Self::NO_LEADER).then_some(leader),
            camera_offset,
            vehicles,
            skid_marks,
        })
    }
}

/// Compress data using LZ4.
#[cfg(feature = "lz4")]
pub fn compress_lz4(data: &[u8]) -> Vec<u8> {
    lz4_flex::compress_prepend_size(data)
}

/// Decompress LZ4 data.
#[cfg(feature = "lz4")]
pub fn decompress_lz4(data: &[u8]) -> io::Result<Vec<u8>> {
    lz4_flex::decompress_size_prepended(data)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Fallback when LZ4 is not available.
#[cfg(not(feature = "lz4"))]
pub fn compress_lz4(data: &[u8]) -> Vec<u8> {
    data.to_vec()
}

#[cfg(not(feature = "lz4"))]
pub fn decompress_lz4(data: &[u8]) -> io::Result<Vec<u8>> {
    Ok(data.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_header() -> CaptureHeader {
        CaptureHeader {
            flags: CaptureFlags {
                compression: CompressionType::Lz4,
                showcase: true,
            },
            world_size: 4000,
            viewport: (1080.0, 1920.0),
            vehicle_count: 40,
            track_seed: 42,
            cycle: 12,
            frame_count: 450,
            track: TrackConfig {
                road_width: 380.0,
                control_points: 14,
                ..Default::default()
            },
        }
    }

    fn sample_frame() -> CapturedFrame {
        CapturedFrame {
            tick: 17,
            leader: Some(1),
            camera_offset: Vec2::new(-120.5, -40.0),
            vehicles: vec![
                VehiclePose {
                    position: Vec2::new(10.0, 20.0),
                    heading: 359.5,
                    speed: 0.0,
                    gates_passed: 0,
                    alive: false,
                    leader: false,
                    trail: Vec::new(),
                    smoke: Vec::new(),
                },
                VehiclePose {
                    position: Vec2::new(1500.25, 800.0),
                    heading: 90.0,
                    speed: 28.9,
                    gates_passed: 12,
                    alive: true,
                    leader: true,
                    trail: vec![Vec2::new(1490.0, 800.0), Vec2::new(1495.0, 800.0)],
                    smoke: vec![SmokeParticle {
                        position: Vec2::new(1480.0, 805.0),
                        life: 9,
                        size: 6.5,
                    }],
                },
            ],
            skid_marks: vec![
                SkidMark {
                    x: 1500,
                    y: 801,
                    intensity: 180,
                },
                SkidMark {
                    x: 1501,
                    y: 801,
                    intensity: 255,
                },
            ],
        }
    }

    #[test]
    fn test_header_roundtrip() {
        let header = sample_header();

        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), header.encoded_len().unwrap());
        assert!(buf.len() > CaptureHeader::FIXED_SIZE);
        assert_eq!(&buf[..4], b"RCAP");

        let mut cursor = Cursor::new(&buf);
        let decoded = CaptureHeader::read_from(&mut cursor).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.track.road_width, 380.0);
        assert_eq!(cursor.position() as usize, buf.len());
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut buf = Vec::new();
        sample_header().write_to(&mut buf).unwrap();
        buf[..4].copy_from_slice(b"FLWA");
        let err = CaptureHeader::read_from(&mut Cursor::new(&buf)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_oversized_track_block_rejected() {
        let mut buf = Vec::new();
        sample_header().write_to(&mut buf).unwrap();
        let len_at = CaptureHeader::FIXED_SIZE;
        buf[len_at..len_at + 4].copy_from_slice(&u32::MAX.to_le_bytes());
        let err = CaptureHeader::read_from(&mut Cursor::new(&buf)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_frame_encode_decode() {
        let frame = sample_frame();
        let bytes = frame.encode();
        // Two poses with their counts, two trail points, one smoke puff, two marks.
        let expected_len = 20 + 2 * (VehiclePose::SIZE + 4) + 2 * 8 + 16 + 4 + 2 * 9;
        assert_eq!(bytes.len(), expected_len);
        assert_eq!(CapturedFrame::decode(&bytes).unwrap(), frame);

        let leaderless = CapturedFrame {
            leader: None,
            ..sample_frame()
        };
        assert_eq!(
            CapturedFrame::decode(&leaderless.encode()).unwrap().leader,
            None
        );
    }

    #[test]
    fn test_truncated_frame_rejected() {
        let bytes = sample_frame().encode();
        assert!(CapturedFrame::decode(&bytes[..bytes.len() - 1]).is_err());
        assert!(CapturedFrame::decode(&bytes[..10]).is_err());

        let mut trailing = bytes.clone();
        trailing.push(0);
        assert!(CapturedFrame::decode(&trailing).is_err());
    }

    #[test]
    fn test_huge_vehicle_count_rejected() {
        let mut bytes = sample_frame().encode();
        bytes[16..20].copy_from_slice(&u32::MAX.to_le_bytes());
        let err = CapturedFrame::decode(&bytes).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_frame_index_roundtrip() {
        let index = FrameIndex {
            offset: 12345678,
            size: 8192,
        };
        let mut buf = Vec::new();
        index.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), FrameIndex::SIZE);
        assert_eq!(FrameIndex::read_from(&mut Cursor::new(&buf)).unwrap(), index);
    }

    #[test]
    fn test_lz4_helpers_roundtrip() {
        let bytes = sample_frame().encode();
        let packed = compress_lz4(&bytes);
        assert_eq!(decompress_lz4(&packed).unwrap(), bytes);
    }
}
