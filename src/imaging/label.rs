//! Watermark label rendering.
//!
//! A label is first rasterized into a [`LabelMask`] (per-pixel glyph
//! coverage), then turned into a translucent RGBA layer with a dark outline
//! and a near-white fill, and finally blended over the photo by the engine.
//!
//! Two renderers exist:
//!
//! | Renderer | Source | Can fail? |
//! |---|---|---|
//! | [`LabelRenderer::Scalable`] | TrueType/OpenType file via `ab_glyph` | loading can, rendering can't |
//! | [`LabelRenderer::Bitmap`] | compiled-in 5×7 glyphs ([`glyphs`](super::glyphs)) | never |
//!
//! [`LabelRenderer::load`] walks the configured font paths and settles on the
//! bitmap renderer when none of them is usable.

use super::calculations::bitmap_scale;
use super::glyphs::{self, CELL_HEIGHT, CELL_WIDTH};
use super::params::Opacity;
use ab_glyph::{Font, FontVec, PxScale, ScaleFont, point};
use image::{Rgba, RgbaImage};
use std::fmt;
use std::path::{Path, PathBuf};

/// Label fill colour (near-white).
pub const FILL: [u8; 3] = [250, 250, 250];
/// Outline colour drawn under the fill.
pub const OUTLINE: [u8; 3] = [0, 0, 0];
/// The fill is drawn once per offset in outline colour before the fill itself.
pub const OUTLINE_OFFSETS: [(i64, i64); 4] = [(-1, -1), (-1, 1), (1, -1), (1, 1)];

/// Glyph coverage for a rendered label, row-major, values in `0.0..=1.0`.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelMask {
    pub width: u32,
    pub height: u32,
    coverage: Vec<f32>,
}

impl LabelMask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            coverage: vec![0.0; (width as usize) * (height as usize)],
        }
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        if x >= self.width || y >= self.height {
            return 0.0;
        }
        self.coverage[(y * self.width + x) as usize]
    }

    /// Add coverage at a possibly out-of-range position (ignored if outside).
    fn accumulate(&mut self, x: i64, y: i64, c: f32) {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return;
        }
        let idx = (y as u32 * self.width + x as u32) as usize;
        self.coverage[idx] = (self.coverage[idx] + c).min(1.0);
    }

    /// Number of pixels with any coverage.
    pub fn inked_pixels(&self) -> usize {
        self.coverage.iter().filter(|c| **c > 0.0).count()
    }
}

pub enum LabelRenderer {
    Scalable { font: FontVec, source: PathBuf },
    Bitmap,
}

impl fmt::Debug for LabelRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelRenderer::Scalable { source, .. } => {
                f.debug_tuple("Scalable").field(source).finish()
            }
            LabelRenderer::Bitmap => f.write_str("Bitmap"),
        }
    }
}

impl LabelRenderer {
    /// Use the first font file that loads; otherwise the bitmap glyphs.
    pub fn load(paths: &[PathBuf]) -> Self {
        for path in paths {
            match load_font(path) {
                Ok(font) => {
                    tracing::debug!(font = %path.display(), "loaded label font");
                    return LabelRenderer::Scalable {
                        font,
                        source: path.clone(),
                    };
                }
                Err(reason) => {
                    tracing::debug!(font = %path.display(), %reason, "font unusable");
                }
            }
        }
        tracing::warn!("no scalable font found, watermark labels use built-in bitmap glyphs");
        LabelRenderer::Bitmap
    }

    pub fn bitmap() -> Self {
        LabelRenderer::Bitmap
    }

    pub fn is_scalable(&self) -> bool {
        matches!(self, LabelRenderer::Scalable { .. })
    }

    /// Font file in use, if any.
    pub fn source(&self) -> Option<&Path> {
        match self {
            LabelRenderer::Scalable { source, .. } => Some(source),
            LabelRenderer::Bitmap => None,
        }
    }

    /// Rasterize `text` at `font_size` pixels.
    pub fn render(&self, text: &str, font_size: u32) -> LabelMask {
        match self {
            LabelRenderer::Scalable { font, .. } => render_scalable(font, text, font_size),
            LabelRenderer::Bitmap => render_bitmap(text, font_size),
        }
    }
}

fn load_font(path: &Path) -> Result<FontVec, String> {
    let data = std::fs::read(path).map_err(|e| e.to_string())?;
    FontVec::try_from_vec(data).map_err(|e| e.to_string())
}

fn render_scalable(font: &FontVec, text: &str, font_size: u32) -> LabelMask {
    let scale = PxScale::from(font_size.max(1) as f32);
    let scaled = font.as_scaled(scale);
    let ascent = scaled.ascent();

    let mut caret = 0.0f32;
    let mut previous = None;
    let mut positioned = Vec::with_capacity(text.len());
    for ch in text.chars() {
        let id = scaled.glyph_id(ch);
        if let Some(prev) = previous {
            caret += scaled.kern(prev, id);
        }
        positioned.push(id.with_scale_and_position(scale, point(caret, ascent)));
        caret += scaled.h_advance(id);
        previous = Some(id);
    }

    let width = caret.ceil().max(1.0) as u32;
    let height = scaled.height().ceil().max(1.0) as u32;
    let mut mask = LabelMask::new(width, height);
    for glyph in positioned {
        if let Some(outlined) = font.outline_glyph(glyph) {
            let bounds = outlined.px_bounds();
            outlined.draw(|x, y, c| {
                mask.accumulate(
                    bounds.min.x as i64 + x as i64,
                    bounds.min.y as i64 + y as i64,
                    c,
                );
            });
        }
    }
    mask
}

fn render_bitmap(text: &str, font_size: u32) -> LabelMask {
    let scale = bitmap_scale(font_size, CELL_HEIGHT);
    let chars = text.chars().count().max(1) as u32;
    // Trailing spacing column is dropped so the label hugs the margin.
    let width = (chars * CELL_WIDTH - 1) * scale;
    let height = glyphs::GLYPH_HEIGHT * scale;
    let mut mask = LabelMask::new(width, height);

    for (i, ch) in text.chars().enumerate() {
        let rows = glyphs::glyph(ch);
        let left = i as u32 * CELL_WIDTH * scale;
        for row in 0..glyphs::GLYPH_HEIGHT {
            for col in 0..glyphs::GLYPH_WIDTH {
                if !glyphs::is_set(&rows, col, row) {
                    continue;
                }
                for dy in 0..scale {
                    for dx in 0..scale {
                        mask.accumulate(
                            (left + col * scale + dx) as i64,
                            (row * scale + dy) as i64,
                            1.0,
                        );
                    }
                }
            }
        }
    }
    mask
}

/// Build a full-canvas transparent layer carrying the outlined label at `origin`.
pub fn label_layer(
    canvas: (u32, u32),
    mask: &LabelMask,
    origin: (u32, u32),
    opacity: Opacity,
) -> RgbaImage {
    let (cw, ch) = canvas;
    let mut layer = RgbaImage::new(cw, ch);
    let (ox, oy) = (origin.0 as i64, origin.1 as i64);

    for (dx, dy) in OUTLINE_OFFSETS {
        paint(&mut layer, mask, (ox + dx, oy + dy), OUTLINE, opacity);
    }
    paint(&mut layer, mask, (ox, oy), FILL, opacity);
    layer
}

/// Blend `color` into the layer wherever the mask has coverage.
fn paint(
    layer: &mut RgbaImage,
    mask: &LabelMask,
    at: (i64, i64),
    color: [u8; 3],
    opacity: Opacity,
) {
    let (lw, lh) = (layer.width() as i64, layer.height() as i64);
    for my in 0..mask.height {
        for mx in 0..mask.width {
            let c = mask.get(mx, my);
            if c <= 0.0 {
                continue;
            }
            let (x, y) = (at.0 + mx as i64, at.1 + my as i64);
            if x < 0 || y < 0 || x >= lw || y >= lh {
                continue;
            }
            let px = layer.get_pixel_mut(x as u32, y as u32);
            let Rgba([r, g, b, a]) = *px;
            let mix =
                |from: u8, to: u8| (from as f32 + (to as f32 - from as f32) * c).round() as u8;
            *px = Rgba([
                mix(r, color[0]),
                mix(g, color[1]),
                mix(b, color[2]),
                a.max(opacity.alpha_for(c)),
            ]);
        }
    }
}
