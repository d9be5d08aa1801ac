//! Image transforms in pure Rust, no system libraries.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Blur** | `image::imageops::blur`, re-encoded as PNG |
//! | **Stamp** | label mask (`ab_glyph` or bitmap glyphs) + `imageops::overlay` |
//! | **Whitelist** | extension table + `image::guess_format` |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for label size and placement (unit testable)
//! - **Parameters**: Data structures describing the look of previews and labels
//! - **Engine**: [`TransformEngine`] trait + [`RustEngine`]
//! - **Label**: Mask rendering and the translucent outlined label layer

mod calculations;
pub mod engine;
mod glyphs;
pub mod label;
pub mod media;
mod params;
pub mod rust_engine;

pub use calculations::{bitmap_scale, label_font_size, label_origin};
pub use engine::{TransformEngine, TransformError};
pub use label::LabelRenderer;
pub use media::{MediaType, MediaWhitelist, known_extensions};
pub use params::{BlurParams, Opacity, WatermarkParams};
pub use rust_engine::RustEngine;
