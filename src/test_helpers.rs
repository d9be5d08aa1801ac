//! Shared test utilities for the blurmark test suite.
//!
//! Provides in-memory image fixtures (generated with the `image` crate, no
//! files on disk), pixel assertions, and builders for submissions,
//! activations, and a [`BotState`] wired to a [`MemoryPlatform`].
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let (state, platform) = mock_state(Arc::new(MockEngine::new()));
//! let outcome = ingest(&state, submission("m1", "alice", &[("a.png", b"img")])).await;
//!
//! let png = solid_png(200, 120, [40, 80, 120, 255]);
//! let out = decode_rgba(&engine.stamp(&png, "42").unwrap());
//! assert!(changed_pixels_in(&out, [40, 80, 120, 255], (100, 60, 200, 120)) > 0);
//! ```

use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgba, RgbaImage};
use tokio::time::Instant;

use crate::bot::{BotState, Deadlines};
use crate::config::BotConfig;
use crate::imaging::{MediaType, TransformEngine};
use crate::platform::{Activation, MemoryPlatform};
use crate::types::{Attachment, Batch, BatchId, ChannelId, ImageAsset, Submission, UserId};

// =========================================================================
// Image fixtures
// =========================================================================

/// Bytes no decoder accepts.
pub const MALFORMED: &[u8] = b"definitely not an image";

fn png_bytes(img: &RgbaImage) -> Vec<u8> {
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(img.as_raw(), img.width(), img.height(), ExtendedColorType::Rgba8)
        .unwrap();
    out
}

/// 8×8-cell black/white checkerboard, maximal local contrast.
pub fn checkerboard_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        if (x / 8 + y / 8) % 2 == 0 {
            Rgba([0, 0, 0, 255])
        } else {
            Rgba([255, 255, 255, 255])
        }
    });
    png_bytes(&img)
}

pub fn solid_png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    png_bytes(&RgbaImage::from_pixel(width, height, Rgba(color)))
}

/// Fully transparent PNG.
pub fn transparent_png(width: u32, height: u32) -> Vec<u8> {
    solid_png(width, height, [0, 0, 0, 0])
}

pub fn solid_jpeg(width: u32, height: u32) -> Vec<u8> {
    let pixels = vec![128u8; (width * height * 3) as usize];
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, 90)
        .write_image(&pixels, width, height, ExtendedColorType::Rgb8)
        .unwrap();
    out
}

pub fn decode_rgba(bytes: &[u8]) -> RgbaImage {
    image::load_from_memory(bytes).unwrap().to_rgba8()
}

/// Variance of the red channel, a cheap sharpness measure.
pub fn contrast(img: &RgbaImage) -> f64 {
    let n = (img.width() * img.height()) as f64;
    let mean = img.pixels().map(|p| p.0[0] as f64).sum::<f64>() / n;
    img.pixels()
        .map(|p| (p.0[0] as f64 - mean).powi(2))
        .sum::<f64>()
        / n
}

/// Pixels differing from `background` inside `(x0, y0, x1, y1)`, end-exclusive.
pub fn changed_pixels_in(img: &RgbaImage, background: [u8; 4], region: (u32, u32, u32, u32)) -> usize {
    let (x0, y0, x1, y1) = region;
    let mut changed = 0;
    for y in y0..y1.min(img.height()) {
        for x in x0..x1.min(img.width()) {
            if img.get_pixel(x, y).0 != background {
                changed += 1;
            }
        }
    }
    changed
}

// =========================================================================
// Events and batches
// =========================================================================

/// Submission on channel `general`.
pub fn submission(id: &str, author: &str, files: &[(&str, &[u8])]) -> Submission {
    Submission {
        id: BatchId(id.into()),
        channel: ChannelId("general".into()),
        author: UserId(author.into()),
        attachments: files
            .iter()
            .map(|(name, bytes)| Attachment {
                filename: name.to_string(),
                bytes: bytes.to_vec(),
            })
            .collect(),
    }
}

/// Activation received now on channel `general`.
pub fn activation(id: &str, requester: &str, custom_id: &str) -> Activation {
    Activation {
        id: id.into(),
        channel: ChannelId("general".into()),
        custom_id: custom_id.into(),
        requester: UserId(requester.into()),
        received_at: Instant::now(),
    }
}

/// Batch with media types taken from the filename extensions.
pub fn batch(id: &str, files: &[(&str, &[u8])]) -> Batch {
    let id = BatchId(id.into());
    Batch {
        id: id.clone(),
        assets: files
            .iter()
            .map(|(name, bytes)| ImageAsset {
                filename: name.to_string(),
                media_type: std::path::Path::new(name)
                    .extension()
                    .and_then(|e| e.to_str())
                    .and_then(MediaType::from_extension)
                    .unwrap_or(MediaType::Png),
                bytes: bytes.to_vec(),
                batch: id.clone(),
            })
            .collect(),
    }
}

// =========================================================================
// Bot state
// =========================================================================

/// Default-config state on a fresh [`MemoryPlatform`].
pub fn mock_state(engine: Arc<dyn TransformEngine>) -> (Arc<BotState>, Arc<MemoryPlatform>) {
    let deadlines = Deadlines::from(&BotConfig::default().deadlines);
    mock_state_with(engine, deadlines)
}

pub fn mock_state_with(
    engine: Arc<dyn TransformEngine>,
    deadlines: Deadlines,
) -> (Arc<BotState>, Arc<MemoryPlatform>) {
    let platform = Arc::new(MemoryPlatform::new());
    let mut state = BotState::new(
        BotConfig::default(),
        engine,
        platform.clone(),
        platform.clone(),
    )
    .unwrap();
    state.deadlines = deadlines;
    (Arc::new(state), platform)
}
