//! Renderer-side colour themes.
//!
//! A [`Theme`] never influences physics. It is passed explicitly to whoever
//! converts a painted [`SurfaceKind`] layer or a trail into pixels.

use serde::{Deserialize, Serialize};

/// RGB triple.
pub type Rgb = [u8; 3];

/// What a pixel of the cosmetic layer shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum SurfaceKind {
    #[default]
    Background = 0,
    /// First kerb stripe colour.
    KerbA = 1,
    /// Alternate kerb stripe colour.
    KerbB = 2,
    Road = 3,
    CenterLine = 4,
}

/// Named colour palette for the cosmetic layer and vehicle overlays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    pub name: String,
    pub background: Rgb,
    pub road: Rgb,
    pub kerb: Rgb,
    pub kerb_alt: Rgb,
    pub center_line: Rgb,
    /// Trail colour of the current leader.
    pub leader_trail: Rgb,
    /// Trail colour of every other vehicle.
    pub trail: Rgb,
    /// Colour of a fully dark skid mark.
    pub skid: Rgb,
}

impl Default for Theme {
    fn default() -> Self {
        Self::pro()
    }
}

impl Theme {
    /// Dark asphalt with red and white kerbs.
    pub fn pro() -> Self {
        Self {
            name: "pro".to_string(),
            background: [20, 20, 25],
            road: [40, 40, 45],
            kerb: [200, 50, 50],
            kerb_alt: [200, 200, 200],
            center_line: [255, 255, 255],
            leader_trail: [0, 255, 65],
            trail: [200, 200, 255],
            skid: [10, 10, 12],
        }
    }

    /// Light grey palette for print and debugging.
    pub fn paper() -> Self {
        Self {
            name: "paper".to_string(),
            background: [245, 245, 240],
            road: [180, 180, 180],
            kerb: [90, 90, 90],
            kerb_alt: [230, 230, 230],
            center_line: [255, 255, 255],
            leader_trail: [220, 0, 0],
            trail: [0, 0, 220],
            skid: [60, 60, 60],
        }
    }

    /// Look up a preset by name.
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "pro" => Some(Self::pro()),
            "paper" => Some(Self::paper()),
            _ => None,
        }
    }

    /// Colour of a painted surface kind.
    #[inline]
    pub fn color(&self, kind: SurfaceKind) -> Rgb {
        match kind {
            SurfaceKind::Background => self.background,
            SurfaceKind::KerbA => self.kerb,
            SurfaceKind::KerbB => self.kerb_alt,
            SurfaceKind::Road => self.road,
            SurfaceKind::CenterLine => self.center_line,
        }
    }

    /// Blend a skid intensity (0..=255) over a base colour.
    pub fn with_skid(&self, base: Rgb, intensity: u8) -> Rgb {
        let t = intensity as u32;
        let mut out = [0u8; 3];
        for ((o, &b), &s) in out.iter_mut().zip(base.iter()).zip(self.skid.iter()) {
            *o = ((b as u32 * (255 - t) + s as u32 * t) / 255) as u8;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        assert_eq!(Theme::preset("pro"), Some(Theme::pro()));
        assert!(Theme::preset("paper").is_some());
        assert!(Theme::preset("neon").is_none());
    }

    #[test]
    fn test_color_lookup() {
        let theme = Theme::pro();
        assert_eq!(theme.color(SurfaceKind::Road), [40, 40, 45]);
        assert_eq!(theme.color(SurfaceKind::KerbB), [200, 200, 200]);
    }

    #[test]
    fn test_skid_blend_endpoints() {
        let theme = Theme::pro();
        assert_eq!(theme.with_skid(theme.road, 0), theme.road);
        assert_eq!(theme.with_skid(theme.road, 255), theme.skid);
    }
}
