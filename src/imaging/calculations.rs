//! Pure calculation functions for label sizing and placement.
//!
//! All functions here are pure and testable without any I/O or images.

/// Font size for an image of the given width.
///
/// Grows linearly with the width and never drops below `floor`, so the label
/// stays readable on thumbnails and does not vanish on large photos.
///
/// ```
/// # use blurmark::imaging::label_font_size;
/// // 300px wide: 300 / 25 = 12, below the floor
/// assert_eq!(label_font_size(300, 20, 25), 20);
/// // 2000px wide: 2000 / 25 = 80
/// assert_eq!(label_font_size(2000, 20, 25), 80);
/// ```
pub fn label_font_size(image_width: u32, floor: u32, divisor: u32) -> u32 {
    (image_width / divisor.max(1)).max(floor)
}

/// Top-left corner of a label anchored to the bottom-right corner.
///
/// # Arguments
/// * `image` - Canvas dimensions (width, height)
/// * `label` - Rendered label dimensions (width, height)
/// * `margin` - Gap kept between the label and the right/bottom edges
///
/// When the label plus margin does not fit, the coordinate saturates at zero
/// so the start of the label stays on the canvas.
pub fn label_origin(image: (u32, u32), label: (u32, u32), margin: u32) -> (u32, u32) {
    let (img_w, img_h) = image;
    let (lbl_w, lbl_h) = label;
    (
        img_w.saturating_sub(lbl_w).saturating_sub(margin),
        img_h.saturating_sub(lbl_h).saturating_sub(margin),
    )
}

/// Integer magnification for the built-in bitmap glyphs at a font size.
///
/// Bitmap glyphs live in a `cell_height` pixel cell; the factor is chosen so
/// the cell is at most the requested size, and is at least 1.
pub fn bitmap_scale(font_size: u32, cell_height: u32) -> u32 {
    (font_size / cell_height.max(1)).max(1)
}
