//! Frame capture for the external renderer.
//!
//! Episodes emit a [`FrameSnapshot`] to an optional [`FrameSink`]. The
//! [`CaptureRecorder`] sink stores the frames in an `.rcap` file that the
//! [`CapturePlayer`] reads back.
//!
//! # File Format
//!
//! ```text
//! Header:
//!   Magic: "RCAP" (4 bytes)
//!   Version: u16
//!   Flags: u16 (compression, showcase)
//!   World size: u32
//!   Viewport: 2 x f32
//!   Vehicle count: u32
//!   Track seed: u64
//!   Cycle: u64
//!   Frame count: u64
//!   Reserved: 8 bytes
//!   Track config length: u32, then the track config as JSON
//!
//! Frame data (variable):
//!   tick u32, leader u32 (u32::MAX = none), camera offset 2 x f32,
//!   vehicle count u32, then per vehicle:
//!     x, y, heading, speed (f32), gates u32, flag byte
//!     (bit 0 alive, bit 1 leader),
//!     trail count u16 + trail points (2 x f32),
//!     smoke count u16 + particles (x, y, size f32, life u32)
//!   skid count u32 + skid cells raised since the previous stored frame
//!   (x u32, y u32, intensity u8).
//!   Optionally LZ4 compressed.
//!
//! Frame index table (frame_count * 16 bytes, at the end of the file):
//!   Offset: u64
//!   Stored size: u64
//! ```

mod format;
mod player;
mod recorder;
mod snapshot;

pub use format::{
    CAPTURE_MAGIC, CAPTURE_VERSION, CaptureFlags, CaptureHeader, CapturedFrame, CompressionType,
    FrameIndex, VehiclePose,
};
pub use player::{CapturePlayer, FrameIterator};
pub use recorder::{CaptureRecorder, CaptureStats, RecorderConfig, capture_path};
pub use snapshot::{FrameSink, FrameSnapshot};
