//! Pure Rust transform engine built on the `image` crate.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Format sniffing | `image::guess_format` checked against the [`MediaWhitelist`] |
//! | Decode (PNG, JPEG, WebP) | `image::load_from_memory_with_format` |
//! | Blur | `image::imageops::blur` (Gaussian) on an RGBA copy |
//! | Label | [`LabelRenderer`] (`ab_glyph` or built-in bitmap glyphs) |
//! | Composite | `image::imageops::overlay` (alpha blend) |
//! | Encode → PNG | `image::codecs::png::PngEncoder` |
//!
//! Every output is an RGBA PNG: lossless, and transparent regions of the
//! source stay transparent.

use super::calculations::{label_font_size, label_origin};
use super::engine::{TransformEngine, TransformError};
use super::label::{LabelRenderer, label_layer};
use super::media::{MediaType, MediaWhitelist};
use super::params::{BlurParams, WatermarkParams};
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, RgbaImage};

pub struct RustEngine {
    blur: BlurParams,
    watermark: WatermarkParams,
    whitelist: MediaWhitelist,
    labels: LabelRenderer,
}

impl RustEngine {
    pub fn new(
        blur: BlurParams,
        watermark: WatermarkParams,
        whitelist: MediaWhitelist,
        labels: LabelRenderer,
    ) -> Self {
        Self {
            blur,
            watermark,
            whitelist,
            labels,
        }
    }

    pub fn labels(&self) -> &LabelRenderer {
        &self.labels
    }

    /// Decode a payload, refusing formats outside the whitelist.
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, TransformError> {
        let format =
            image::guess_format(bytes).map_err(|e| TransformError::Decode(e.to_string()))?;
        let media = MediaType::from_image_format(format)
            .filter(|m| self.whitelist.admits(*m))
            .ok_or_else(|| TransformError::Decode(format!("unsupported format {format:?}")))?;
        image::load_from_memory_with_format(bytes, media.image_format())
            .map_err(|e| TransformError::Decode(e.to_string()))
    }
}

impl Default for RustEngine {
    fn default() -> Self {
        Self::new(
            BlurParams::default(),
            WatermarkParams::default(),
            MediaWhitelist::default(),
            LabelRenderer::bitmap(),
        )
    }
}

/// Encode an RGBA buffer as PNG.
fn encode_png(img: &RgbaImage) -> Result<Vec<u8>, TransformError> {
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(
            img.as_raw(),
            img.width(),
            img.height(),
            ExtendedColorType::Rgba8,
        )
        .map_err(|e| TransformError::Encode(e.to_string()))?;
    Ok(out)
}

impl TransformEngine for RustEngine {
    fn blur(&self, bytes: &[u8]) -> Result<Vec<u8>, TransformError> {
        let img = self.decode(bytes)?;
        let blurred = image::imageops::blur(&img.to_rgba8(), self.blur.radius);
        encode_png(&blurred)
    }

    fn stamp(&self, bytes: &[u8], identity: &str) -> Result<Vec<u8>, TransformError> {
        let img = self.decode(bytes)?;
        let mut canvas = img.to_rgba8();
        let (width, height) = canvas.dimensions();

        let font_size = label_font_size(
            width,
            self.watermark.font_size_floor,
            self.watermark.font_size_divisor,
        );
        let mask = self
            .labels
            .render(&self.watermark.label_for(identity), font_size);
        let origin = label_origin(
            (width, height),
            (mask.width, mask.height),
            self.watermark.margin,
        );
        let layer = label_layer((width, height), &mask, origin, self.watermark.opacity);

        image::imageops::overlay(&mut canvas, &layer, 0, 0);
        encode_png(&canvas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;

    fn engine() -> RustEngine {
        RustEngine::default()
    }

    // =========================================================================
    // blur
    // =========================================================================

    #[test]
    fn blur_returns_png_with_same_dimensions() {
        let out = engine().blur(&checkerboard_png(64, 48)).unwrap();
        let decoded = decode_rgba(&out);
        assert_eq!(decoded.dimensions(), (64, 48));
        assert_eq!(image::guess_format(&out).unwrap(), image::ImageFormat::Png);
    }

    #[test]
    fn blur_smooths_checkerboard() {
        let input = checkerboard_png(64, 48);
        let out = decode_rgba(&engine().blur(&input).unwrap());
        let original = decode_rgba(&input);
        assert!(contrast(&out) < contrast(&original));
    }

    #[test]
    fn blur_is_deterministic() {
        let input = checkerboard_png(40, 40);
        assert_eq!(engine().blur(&input).unwrap(), engine().blur(&input).unwrap());
    }

    #[test]
    fn blur_accepts_jpeg() {
        let out = engine().blur(&solid_jpeg(32, 32)).unwrap();
        assert_eq!(decode_rgba(&out).dimensions(), (32, 32));
    }

    #[test]
    fn blur_preserves_transparency() {
        let out = decode_rgba(&engine().blur(&transparent_png(32, 32)).unwrap());
        assert!(out.pixels().all(|p| p.0[3] == 0));
    }

    #[test]
    fn blur_malformed_is_decode_error() {
        let result = engine().blur(MALFORMED);
        assert!(matches!(result, Err(TransformError::Decode(_))));
    }

    #[test]
    fn blur_rejects_format_outside_whitelist() {
        let png_only = RustEngine::new(
            BlurParams::default(),
            WatermarkParams::default(),
            MediaWhitelist::new(["png"]),
            LabelRenderer::bitmap(),
        );
        let result = png_only.blur(&solid_jpeg(16, 16));
        assert!(matches!(result, Err(TransformError::Decode(_))));
    }

    // =========================================================================
    // stamp
    // =========================================================================

    #[test]
    fn stamp_leaves_top_left_untouched() {
        let input = solid_png(200, 120, [40, 80, 120, 255]);
        let out = decode_rgba(&engine().stamp(&input, "42").unwrap());
        assert_eq!(out.dimensions(), (200, 120));
        assert_eq!(out.get_pixel(0, 0).0, [40, 80, 120, 255]);
        assert_eq!(out.get_pixel(50, 50).0, [40, 80, 120, 255]);
    }

    #[test]
    fn stamp_marks_bottom_right_region() {
        let input = solid_png(200, 120, [40, 80, 120, 255]);
        let out = decode_rgba(&engine().stamp(&input, "42").unwrap());
        let changed = changed_pixels_in(&out, [40, 80, 120, 255], (100, 60, 200, 120));
        assert!(changed > 0, "no label pixels in bottom-right quadrant");
        // Margin strip along the right edge stays clean.
        assert_eq!(changed_pixels_in(&out, [40, 80, 120, 255], (190, 0, 200, 120)), 0);
    }

    #[test]
    fn stamp_does_not_mutate_input() {
        let input = solid_png(200, 120, [10, 10, 10, 255]);
        let before = input.clone();
        let first = engine().stamp(&input, "1111").unwrap();
        assert_eq!(input, before);
        let second = engine().stamp(&input, "2222").unwrap();
        assert_eq!(input, before);
        assert_ne!(first, second);
    }

    #[test]
    fn stamp_same_identity_is_deterministic() {
        let input = solid_png(120, 80, [0, 0, 0, 255]);
        assert_eq!(
            engine().stamp(&input, "u").unwrap(),
            engine().stamp(&input, "u").unwrap()
        );
    }

    #[test]
    fn stamp_label_grows_on_wide_images() {
        let color = [30, 30, 30, 255];
        let small = decode_rgba(&engine().stamp(&solid_png(300, 200, color), "9").unwrap());
        let large = decode_rgba(&engine().stamp(&solid_png(2000, 400, color), "9").unwrap());
        let small_ink = changed_pixels_in(&small, color, (0, 0, 300, 200));
        let large_ink = changed_pixels_in(&large, color, (0, 0, 2000, 400));
        assert!(large_ink > small_ink * 4);
    }

    #[test]
    fn stamp_tiny_image_does_not_panic() {
        let out = engine().stamp(&solid_png(4, 4, [0, 0, 0, 255]), "123456").unwrap();
        assert_eq!(decode_rgba(&out).dimensions(), (4, 4));
    }

    #[test]
    fn stamp_malformed_is_decode_error() {
        let result = engine().stamp(MALFORMED, "42");
        assert!(matches!(result, Err(TransformError::Decode(_))));
    }

    #[test]
    fn stamp_with_missing_font_uses_fallback() {
        let engine = RustEngine::new(
            BlurParams::default(),
            WatermarkParams::default(),
            MediaWhitelist::default(),
            LabelRenderer::load(&["/nonexistent/DejaVuSans.ttf".into()]),
        );
        assert!(!engine.labels().is_scalable());
        assert!(engine.stamp(&solid_png(100, 100, [0, 0, 0, 255]), "7").is_ok());
    }
}
