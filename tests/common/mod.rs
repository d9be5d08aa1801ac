//! Fixtures shared by the integration tests.

use std::sync::Arc;

use blurmark::bot::BotState;
use blurmark::config::BotConfig;
use blurmark::imaging::{LabelRenderer, RustEngine};
use blurmark::platform::{Activation, MemoryPlatform};
use blurmark::types::{Attachment, BatchId, ChannelId, Submission, UserId};
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgba, RgbaImage};
use tokio::time::Instant;

pub fn solid_png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba(color));
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(img.as_raw(), width, height, ExtendedColorType::Rgba8)
        .unwrap();
    out
}

pub fn decode_rgba(bytes: &[u8]) -> RgbaImage {
    image::load_from_memory(bytes).unwrap().to_rgba8()
}

/// Real engine with bitmap labels, default config, in-memory platform.
pub fn real_state() -> (Arc<BotState>, Arc<MemoryPlatform>) {
    let config = BotConfig::default();
    let engine = Arc::new(RustEngine::new(
        config.blur_params(),
        config.watermark_params(),
        config.whitelist(),
        LabelRenderer::bitmap(),
    ));
    let platform = Arc::new(MemoryPlatform::new());
    let state = BotState::new(config, engine, platform.clone(), platform.clone()).unwrap();
    (Arc::new(state), platform)
}

pub fn submission(id: &str, author: &str, files: Vec<(&str, Vec<u8>)>) -> Submission {
    Submission {
        id: BatchId(id.into()),
        channel: ChannelId("general".into()),
        author: UserId(author.into()),
        attachments: files
            .into_iter()
            .map(|(filename, bytes)| Attachment {
                filename: filename.to_string(),
                bytes,
            })
            .collect(),
    }
}

pub fn activation(id: &str, requester: &str, custom_id: &str) -> Activation {
    Activation {
        id: id.into(),
        channel: ChannelId("general".into()),
        custom_id: custom_id.into(),
        requester: UserId(requester.into()),
        received_at: Instant::now(),
    }
}
