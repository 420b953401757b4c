//! Intensity-to-glyph mapping.
//!
//! A [`GlyphRamp`] holds characters ordered from visually densest to
//! sparsest. Each 8-bit luma sample `p` selects `ramp[p * len / 256]`, so the
//! 256 possible intensities are split into `len` equal bands. Optional
//! [`Threshold`] blanking forces dark samples to a space regardless of band.

use image::GrayImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Glyph emitted for samples blanked by the threshold rule.
pub const BLANK_GLYPH: char = ' ';

/// Ordered set of glyphs, densest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphRamp {
    glyphs: Vec<char>,
}

impl GlyphRamp {
    pub fn new(ramp: &str) -> Result<Self> {
        let glyphs: Vec<char> = ramp.chars().collect();
        if glyphs.is_empty() {
            return Err(Error::InvalidConfig("glyph ramp must contain at least one character".into()));
        }
        Ok(Self { glyphs })
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    /// Ramp index for an intensity: `floor(p * len / 256)`, clamped.
    #[inline]
    pub fn index_for(&self, intensity: u8) -> usize {
        let len = self.glyphs.len();
        (intensity as usize * len / 256).min(len - 1)
    }

    #[inline]
    pub fn glyph_for(&self, intensity: u8) -> char {
        self.glyphs[self.index_for(intensity)]
    }
}

/// Dark-pixel blanking rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Threshold {
    pub enabled: bool,
    /// Samples strictly below this value are blanked when enabled
    pub value: u8,
}

impl Default for Threshold {
    fn default() -> Self {
        Self { enabled: true, value: 25 }
    }
}

impl Threshold {
    pub fn disabled() -> Self {
        Self { enabled: false, ..Self::default() }
    }

    #[inline]
    pub fn blanks(&self, intensity: u8) -> bool {
        self.enabled && intensity < self.value
    }
}

/// Glyph for a single sample under the given ramp and threshold rule.
#[inline]
pub fn char_for(intensity: u8, ramp: &GlyphRamp, threshold: Threshold) -> char {
    if threshold.blanks(intensity) {
        BLANK_GLYPH
    } else {
        ramp.glyph_for(intensity)
    }
}

/// Maps every sample of `grid` to a glyph, returning rows top to bottom.
pub fn map_grid(grid: &GrayImage, ramp: &GlyphRamp, threshold: Threshold) -> Vec<Vec<char>> {
    let width = grid.width() as usize;
    if width == 0 {
        return Vec::new();
    }
    grid.as_raw()
        .par_chunks(width)
        .map(|row| row.iter().map(|&p| char_for(p, ramp, threshold)).collect())
        .collect()
}

/// Renders `grid` straight to text: rows joined by `\n`, no trailing newline.
pub fn render_text(grid: &GrayImage, ramp: &GlyphRamp, threshold: Threshold) -> String {
    let (w, h) = grid.dimensions();
    let mut out = String::with_capacity((w as usize + 1) * h as usize);
    for (y, row) in map_grid(grid, ramp, threshold).into_iter().enumerate() {
        if y > 0 {
            out.push('\n');
        }
        out.extend(row);
    }
    out
}
