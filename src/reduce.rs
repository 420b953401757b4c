//! Downsampling of luma frames to the character-cell grid.

use image::imageops::{self, FilterType};
use image::GrayImage;

use crate::error::{Error, Result};

/// Vertical compression applied to the row count. Terminal cells are roughly
/// twice as tall as they are wide.
pub const DEFAULT_FONT_RATIO: f32 = 0.55;

/// Cell grid dimensions for a `src_w`×`src_h` frame rendered `columns` wide.
///
/// Rows are `round(src_h / src_w * columns * font_ratio)`, never less than 1.
pub fn target_dimensions(src_w: u32, src_h: u32, columns: u32, font_ratio: f32) -> Result<(u32, u32)> {
    if src_w == 0 || src_h == 0 {
        return Err(Error::Decode(format!("frame has zero size ({}x{})", src_w, src_h)));
    }
    if columns == 0 {
        return Err(Error::InvalidConfig("columns must be at least 1".into()));
    }
    let rows = (src_h as f64 / src_w as f64 * columns as f64 * font_ratio as f64).round() as u32;
    Ok((columns, rows.max(1)))
}

/// Character-cell dimensions of a rendered frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellGrid {
    pub columns: u32,
    pub rows: u32,
}

impl CellGrid {
    /// Grid for a `width`×`height` frame; see [`target_dimensions`].
    pub fn for_frame(width: u32, height: u32, columns: u32, font_ratio: f32) -> Result<Self> {
        let (columns, rows) = target_dimensions(width, height, columns, font_ratio)?;
        Ok(Self { columns, rows })
    }
}

/// Resamples `luma` to exactly the cell grid using bilinear filtering.
pub fn reduce(luma: &GrayImage, columns: u32, font_ratio: f32) -> Result<GrayImage> {
    let (w, h) = luma.dimensions();
    let (target_w, target_h) = target_dimensions(w, h, columns, font_ratio)?;
    Ok(resize_to(luma, target_w, target_h))
}

/// Resamples `luma` to `width`×`height`, passing it through when already sized.
pub fn resize_to(luma: &GrayImage, width: u32, height: u32) -> GrayImage {
    if luma.dimensions() == (width, height) {
        return luma.clone();
    }
    imageops::resize(luma, width, height, FilterType::Triangle)
}
