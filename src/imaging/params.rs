//! Parameter types for the two transforms.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between configuration (which decides the look of previews and
//! watermarks) and the [`engine`](super::engine) that does the pixel work.
//!
//! ## Types
//!
//! - [`Opacity`]: Label translucency (0–255, default 150). Clamped on construction.
//! - [`BlurParams`]: Gaussian smoothing radius for public previews.
//! - [`WatermarkParams`]: Label prefix, opacity, margin, and font sizing rule.

/// Alpha applied to the watermark label (0 = invisible, 255 = opaque).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opacity(pub u8);

impl Opacity {
    pub fn new(value: u32) -> Self {
        Self(value.min(255) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Scale a glyph coverage (0.0–1.0) to a pixel alpha.
    pub fn alpha_for(self, coverage: f32) -> u8 {
        (self.0 as f32 * coverage.clamp(0.0, 1.0)).round() as u8
    }
}

impl Default for Opacity {
    fn default() -> Self {
        Self(150)
    }
}

/// Smoothing applied to public previews.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlurParams {
    /// Gaussian standard deviation in pixels.
    pub radius: f32,
}

impl Default for BlurParams {
    fn default() -> Self {
        Self { radius: 15.0 }
    }
}

/// How the requester's label is drawn.
#[derive(Debug, Clone, PartialEq)]
pub struct WatermarkParams {
    /// Text placed before the identity, e.g. `"ID: "`.
    pub label_prefix: String,
    pub opacity: Opacity,
    /// Distance in pixels from the right and bottom edges.
    pub margin: u32,
    /// Smallest font size ever used.
    pub font_size_floor: u32,
    /// Font size grows as `width / divisor` above the floor.
    pub font_size_divisor: u32,
}

impl WatermarkParams {
    pub fn label_for(&self, identity: &str) -> String {
        format!("{}{}", self.label_prefix, identity)
    }
}

impl Default for WatermarkParams {
    fn default() -> Self {
        Self {
            label_prefix: "ID: ".to_string(),
            opacity: Opacity::default(),
            margin: 20,
            font_size_floor: 20,
            font_size_divisor: 25,
        }
    }
}
