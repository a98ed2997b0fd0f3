//! Square raster layers over the world.
//!
//! Cells are unit squares; cell `(x, y)` covers `[x, x+1) x [y, y+1)` and a
//! disk covers a cell when the cell centre lies inside it. Three layers share
//! this convention:
//!
//! - [`DrivableMask`]: the collision surface, the only drivability signal.
//! - [`VisualLayer`]: cosmetic [`SurfaceKind`] per cell, never queried by physics.
//! - [`SkidLayer`]: cosmetic skid intensity, written concurrently by vehicles.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, PoisonError};

use super::geometry::Vec2;
use crate::schema::{Rgb, SurfaceKind, Theme};

/// Result of a mask lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Drivable,
    OffTrack,
    OutOfBounds,
}

impl Surface {
    #[inline]
    pub fn is_drivable(self) -> bool {
        self == Surface::Drivable
    }
}

/// Inclusive column range of the cells in row `y` covered by a disk,
/// clipped to `[0, size)`. `None` when the row misses the disk.
#[inline]
fn disk_row_span(center: Vec2, radius: f32, y: i64, size: usize) -> Option<(usize, usize)> {
    let dy = y as f32 + 0.5 - center.y;
    let rem = radius * radius - dy * dy;
    if rem < 0.0 {
        return None;
    }
    let half = rem.sqrt();
    let x0 = (center.x - half - 0.5).ceil().max(0.0);
    let x1 = (center.x + half - 0.5).floor().min(size as f32 - 1.0);
    if x0 > x1 {
        return None;
    }
    Some((x0 as usize, x1 as usize))
}

/// Rows a disk can touch, clipped to the raster.
#[inline]
fn disk_rows(center: Vec2, radius: f32, size: usize) -> std::ops::Range<i64> {
    let y0 = ((center.y - radius).floor() as i64).max(0);
    let y1 = ((center.y + radius).ceil() as i64 + 1).min(size as i64);
    y0..y1.max(y0)
}

/// Boolean drivable field over a `size x size` world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrivableMask {
    size: usize,
    cells: Vec<bool>,
}

impl DrivableMask {
    /// All-off-track mask.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            cells: vec![false; size * size],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    fn index(&self, x: usize, y: usize) -> usize {
        y * self.size + x
    }

    /// Mark every cell whose centre lies inside the disk as drivable.
    pub fn fill_disk(&mut self, center: Vec2, radius: f32) {
        for y in disk_rows(center, radius, self.size) {
            if let Some((x0, x1)) = disk_row_span(center, radius, y, self.size) {
                let row = self.index(0, y as usize);
                self.cells[row + x0..=row + x1].fill(true);
            }
        }
    }

    /// Stamp disks along a closed polyline so that consecutive stamps are at
    /// most `spacing` apart in arc length.
    pub fn stroke_closed(&mut self, points: &[Vec2], radius: f32, spacing: f32) {
        let Some(&first) = points.first() else {
            return;
        };
        self.fill_disk(first, radius);
        let mut since_stamp = 0.0;
        let mut prev = first;
        for &p in points.iter().skip(1).chain(std::iter::once(&first)) {
            since_stamp += prev.distance(p);
            if since_stamp >= spacing {
                self.fill_disk(p, radius);
                since_stamp = 0.0;
            }
            prev = p;
        }
    }

    /// Classify the cell containing `point`.
    #[inline]
    pub fn query(&self, point: Vec2) -> Surface {
        if !point.is_finite() {
            return Surface::OutOfBounds;
        }
        let (x, y) = point.floor();
        self.query_cell(x, y)
    }

    /// Classify an integer cell.
    #[inline]
    pub fn query_cell(&self, x: i64, y: i64) -> Surface {
        if x < 0 || y < 0 || x >= self.size as i64 || y >= self.size as i64 {
            return Surface::OutOfBounds;
        }
        if self.cells[self.index(x as usize, y as usize)] {
            Surface::Drivable
        } else {
            Surface::OffTrack
        }
    }

    /// Number of drivable cells.
    pub fn drivable_count(&self) -> usize {
        self.cells.iter().filter(|&&c| c).count()
    }

    /// Number of 4-connected components of cells with the given value.
    pub fn component_count(&self, drivable: bool) -> usize {
        let mut seen = vec![false; self.cells.len()];
        let mut components = 0;
        for start in 0..self.cells.len() {
            if seen[start] || self.cells[start] != drivable {
                continue;
            }
            components += 1;
            self.flood(start, drivable, &mut seen);
        }
        components
    }

    /// Whether `point` lies in an off-track region that is cut off from the
    /// world border by drivable cells.
    pub fn encloses(&self, point: Vec2) -> bool {
        if self.query(point) != Surface::OffTrack {
            return false;
        }
        let (x, y) = point.floor();
        let mut seen = vec![false; self.cells.len()];
        let (_, touches_border) = self.flood(self.index(x as usize, y as usize), false, &mut seen);
        !touches_border
    }

    /// Turn enclosed off-track regions of at most `max_cells` cells into
    /// drivable cells. Returns the number of regions filled.
    ///
    /// Stamping disks along a curve can leave single unstamped cells right at
    /// the stroke edge, fully surrounded by road.
    pub fn fill_small_holes(&mut self, max_cells: usize) -> usize {
        let mut seen = vec![false; self.cells.len()];
        let mut holes = Vec::new();
        for start in 0..self.cells.len() {
            if seen[start] || self.cells[start] {
                continue;
            }
            let (cells, touches_border) = self.flood(start, false, &mut seen);
            if !touches_border && cells <= max_cells {
                holes.push(start);
            }
        }
        for &start in &holes {
            self.fill_region(start);
        }
        holes.len()
    }

    fn fill_region(&mut self, start: usize) {
        let size = self.size;
        let mut queue = VecDeque::new();
        self.cells[start] = true;
        queue.push_back(start);
        while let Some(idx) = queue.pop_front() {
            let (x, y) = (idx % size, idx / size);
            let neighbours = [
                (x > 0).then(|| idx - 1),
                (x + 1 < size).then(|| idx + 1),
                (y > 0).then(|| idx - size),
                (y + 1 < size).then(|| idx + size),
            ];
            for n in neighbours.into_iter().flatten() {
                if !self.cells[n] {
                    self.cells[n] = true;
                    queue.push_back(n);
                }
            }
        }
    }

    /// Breadth-first fill over cells equal to `value`, marking `seen`.
    /// Returns the region's cell count and whether it touches the border.
    fn flood(&self, start: usize, value: bool, seen: &mut [bool]) -> (usize, bool) {
        let size = self.size;
        let mut touches_border = false;
        let mut count = 0;
        let mut queue = VecDeque::new();
        seen[start] = true;
        queue.push_back(start);
        while let Some(idx) = queue.pop_front() {
            count += 1;
            let (x, y) = (idx % size, idx / size);
            if x == 0 || y == 0 || x == size - 1 || y == size - 1 {
                touches_border = true;
            }
            let mut visit = |n: usize| {
                if !seen[n] && self.cells[n] == value {
                    seen[n] = true;
                    queue.push_back(n);
                }
            };
            if x > 0 {
                visit(idx - 1);
            }
            if x + 1 < size {
                visit(idx + 1);
            }
            if y > 0 {
                visit(idx - size);
            }
            if y + 1 < size {
                visit(idx + size);
            }
        }
        (count, touches_border)
    }
}

/// Cosmetic surface layer, one [`SurfaceKind`] per cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisualLayer {
    size: usize,
    cells: Vec<SurfaceKind>,
}

impl VisualLayer {
    /// Layer filled with background.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            cells: vec![SurfaceKind::Background; size * size],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Paint every cell whose centre lies inside the disk.
    pub fn paint_disk(&mut self, center: Vec2, radius: f32, kind: SurfaceKind) {
        for y in disk_rows(center, radius, self.size) {
            if let Some((x0, x1)) = disk_row_span(center, radius, y, self.size) {
                let row = y as usize * self.size;
                self.cells[row + x0..=row + x1].fill(kind);
            }
        }
    }

    /// Paint an open polyline of the given width with round joins.
    pub fn paint_polyline(&mut self, points: &[Vec2], width: f32, kind: SurfaceKind) {
        let radius = width / 2.0;
        let step = radius.max(0.5);
        for pair in points.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let steps = (a.distance(b) / step).ceil().max(1.0) as usize;
            for s in 0..=steps {
                self.paint_disk(a.lerp(b, s as f32 / steps as f32), radius, kind);
            }
        }
    }

    /// Painted kind of a cell, `None` outside the world.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> Option<SurfaceKind> {
        if x < self.size && y < self.size {
            Some(self.cells[y * self.size + x])
        } else {
            None
        }
    }

    /// Convert to packed RGB rows using a theme.
    pub fn to_rgb(&self, theme: &Theme) -> Vec<Rgb> {
        self.cells.iter().map(|&k| theme.color(k)).collect()
    }

    /// Cell count per kind, indexed by `SurfaceKind as usize`.
    pub fn histogram(&self) -> [usize; 5] {
        let mut counts = [0usize; 5];
        for &k in &self.cells {
            counts[k as usize] += 1;
        }
        counts
    }
}

/// One raised skid cell, as recorded in the change log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkidMark {
    pub x: u32,
    pub y: u32,
    pub intensity: u8,
}

/// Skid-mark intensity per cell.
///
/// Vehicles stamp marks while stepping in parallel, so cells are atomic and
/// a stamp only ever raises the stored intensity. Every raise is also
/// appended to a change log so recorders can store increments instead of
/// the whole layer. Replaying the log with `max` reproduces the layer
/// regardless of the order concurrent stamps landed in.
#[derive(Debug)]
pub struct SkidLayer {
    size: usize,
    cells: Vec<AtomicU8>,
    log: Mutex<Vec<SkidMark>>,
}

impl SkidLayer {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            cells: (0..size * size).map(|_| AtomicU8::new(0)).collect(),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Raise the intensity of every cell in a small disk.
    pub fn stamp(&self, center: Vec2, radius: f32, intensity: u8) {
        let mut raised = Vec::new();
        for y in disk_rows(center, radius, self.size) {
            if let Some((x0, x1)) = disk_row_span(center, radius, y, self.size) {
                let row = y as usize * self.size;
                for x in x0..=x1 {
                    if self.cells[row + x].fetch_max(intensity, Ordering::Relaxed) < intensity {
                        raised.push(SkidMark {
                            x: x as u32,
                            y: y as u32,
                            intensity,
                        });
                    }
                }
            }
        }
        if !raised.is_empty() {
            self.log
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend(raised);
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        if x < self.size && y < self.size {
            self.cells[y * self.size + x].load(Ordering::Relaxed)
        } else {
            0
        }
    }

    /// Number of marked cells.
    pub fn marked_count(&self) -> usize {
        self.cells
            .iter()
            .filter(|c| c.load(Ordering::Relaxed) > 0)
            .count()
    }

    /// Length of the change log.
    pub fn change_count(&self) -> usize {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Log entries from position `cursor` onwards.
    pub fn changes_since(&self, cursor: usize) -> Vec<SkidMark> {
        let log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        log.get(cursor..).map(<[SkidMark]>::to_vec).unwrap_or_default()
    }

    pub fn clear(&self) {
        for cell in &self.cells {
            cell.store(0, Ordering::Relaxed);
        }
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}
