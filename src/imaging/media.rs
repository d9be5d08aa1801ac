//! Media-type whitelist.
//!
//! Attachments are admitted by their declared filename extension
//! (case-insensitive). At decode time the payload's magic bytes are sniffed
//! again and must also map to a whitelisted type, so a renamed file of an
//! unsupported format still fails with a decode error rather than reaching a
//! decoder we never meant to expose.

use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Raster formats the pipeline can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Png,
    Jpeg,
    WebP,
}

/// Extension table. Several extensions may map to the same type.
const EXTENSIONS: &[(&str, MediaType)] = &[
    ("png", MediaType::Png),
    ("jpg", MediaType::Jpeg),
    ("jpeg", MediaType::Jpeg),
    ("webp", MediaType::WebP),
];

impl MediaType {
    /// Map a bare extension (no dot) to a media type.
    pub fn from_extension(ext: &str) -> Option<Self> {
        EXTENSIONS
            .iter()
            .find(|(e, _)| e.eq_ignore_ascii_case(ext))
            .map(|(_, t)| *t)
    }

    pub fn image_format(self) -> ImageFormat {
        match self {
            MediaType::Png => ImageFormat::Png,
            MediaType::Jpeg => ImageFormat::Jpeg,
            MediaType::WebP => ImageFormat::WebP,
        }
    }

    pub fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Png => Some(MediaType::Png),
            ImageFormat::Jpeg => Some(MediaType::Jpeg),
            ImageFormat::WebP => Some(MediaType::WebP),
            _ => None,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MediaType::Png => "png",
            MediaType::Jpeg => "jpeg",
            MediaType::WebP => "webp",
        };
        f.write_str(name)
    }
}

/// Every extension the crate knows how to decode.
pub fn known_extensions() -> impl Iterator<Item = &'static str> {
    EXTENSIONS.iter().map(|(e, _)| *e)
}

/// The set of media types admitted by configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaWhitelist {
    extensions: Vec<String>,
}

impl MediaWhitelist {
    /// Build a whitelist from configured extensions. Unknown extensions are
    /// kept out; config validation rejects them before we get here.
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| MediaType::from_extension(e).is_some())
            .collect();
        Self { extensions }
    }

    /// Classify a declared filename. `None` means the attachment is ignored.
    pub fn classify(&self, filename: &str) -> Option<MediaType> {
        let ext = Path::new(filename).extension()?.to_str()?.to_ascii_lowercase();
        if !self.extensions.iter().any(|e| *e == ext) {
            return None;
        }
        MediaType::from_extension(&ext)
    }

    /// Whether a sniffed payload format is admitted.
    pub fn admits(&self, media: MediaType) -> bool {
        self.extensions
            .iter()
            .any(|e| MediaType::from_extension(e) == Some(media))
    }
}

impl Default for MediaWhitelist {
    fn default() -> Self {
        Self::new(["png", "jpg", "jpeg"])
    }
}
