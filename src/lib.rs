//! # vidascii - Video to ASCII Playback Library
//!
//! `vidascii` decodes a video file and plays it back as text, either straight
//! into the terminal or through a small HTTP server that browsers poll.
//!
//! ## Features
//!
//! - Frame-by-frame decoding through an `ffmpeg` child process
//! - Aspect-correct downsampling to a character grid
//! - Configurable glyph ramps with optional dark-pixel blanking
//! - Parallel row mapping for wide grids
//! - Hardware-accelerated decode when the local `ffmpeg` supports it
//!
//! ## Example
//!
//! ```no_run
//! use vidascii::config::FfmpegConfig;
//! use vidascii::pipeline::select_pipeline;
//! use vidascii::shutdown::Shutdown;
//! use vidascii::{app, RenderOptions};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let ffmpeg = FfmpegConfig::default();
//! let options = RenderOptions::display().with_columns(120);
//! let pipeline = select_pipeline(&ffmpeg);
//!
//! let source = app::open_video(Path::new("clip.mp4"), pipeline.as_ref(), &ffmpeg, &options)?;
//! let stats = app::play_in_terminal(source, pipeline.as_ref(), &options, &Shutdown::new())?;
//! println!("{} frames", stats.frames);
//! # Ok(())
//! # }
//! ```
//!
//! ## Rendering a single frame
//!
//! ```
//! use vidascii::{FrameRenderer, RenderOptions};
//! use vidascii::glyph::Threshold;
//! use image::GrayImage;
//!
//! let options = RenderOptions::serve()
//!     .with_ramp("@ ")
//!     .with_threshold(Threshold::disabled());
//! let renderer = FrameRenderer::new(&options).unwrap();
//! let grid = GrayImage::from_raw(2, 1, vec![0, 255]).unwrap();
//! assert_eq!(renderer.render(grid).as_str(), "@ ");
//! ```

pub mod app;
pub mod config;
pub mod error;
pub mod glyph;
pub mod pipeline;
pub mod player;
pub mod reduce;
pub mod server;
pub mod shutdown;
pub mod source;
pub mod store;
pub mod terminal;

use image::GrayImage;

pub use error::{Error, Result};
use glyph::{render_text, GlyphRamp, Threshold};
pub use player::PlaybackStats;
use reduce::DEFAULT_FONT_RATIO;
pub use store::{FrameStore, TextFrame};

/// Rendering profile shared by both playback modes.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    /// Glyphs ordered from densest to sparsest
    pub ramp: String,
    /// Target width in characters
    pub columns: u32,
    /// Vertical compression applied to the row count
    pub font_ratio: f32,
    /// Dark-pixel blanking rule
    pub threshold: Threshold,
    /// Frame rate used when the source does not report a usable one
    pub fallback_fps: f64,
    /// Multiplier on the inter-frame delay
    pub pacing_bias: f64,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::display()
    }
}

impl RenderOptions {
    /// Terminal playback profile.
    pub fn display() -> Self {
        Self {
            ramp: "~*+=-:. ".to_string(),
            columns: 100,
            font_ratio: DEFAULT_FONT_RATIO,
            threshold: Threshold::default(),
            fallback_fps: 12.0,
            pacing_bias: 1.5,
        }
    }

    /// HTTP streaming profile: wider grid and a denser ramp.
    pub fn serve() -> Self {
        Self {
            ramp: "@%#*+=-:. ".to_string(),
            columns: 250,
            font_ratio: DEFAULT_FONT_RATIO,
            threshold: Threshold::default(),
            fallback_fps: 30.0,
            pacing_bias: 1.0,
        }
    }

    pub fn with_ramp(mut self, ramp: impl Into<String>) -> Self {
        self.ramp = ramp.into();
        self
    }

    pub fn with_columns(mut self, columns: u32) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_font_ratio(mut self, font_ratio: f32) -> Self {
        self.font_ratio = font_ratio;
        self
    }

    pub fn with_threshold(mut self, threshold: Threshold) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_fallback_fps(mut self, fps: f64) -> Self {
        self.fallback_fps = fps;
        self
    }

    pub fn with_pacing_bias(mut self, bias: f64) -> Self {
        self.pacing_bias = bias;
        self
    }

    pub fn validate(&self) -> Result<()> {
        GlyphRamp::new(&self.ramp)?;
        if self.columns == 0 {
            return Err(Error::InvalidConfig("columns must be at least 1".into()));
        }
        if !(self.font_ratio.is_finite() && self.font_ratio > 0.0) {
            return Err(Error::InvalidConfig(format!("font_ratio must be positive, got {}", self.font_ratio)));
        }
        if !(self.fallback_fps.is_finite() && self.fallback_fps > 0.0) {
            return Err(Error::InvalidConfig(format!("fallback_fps must be positive, got {}", self.fallback_fps)));
        }
        if !(self.pacing_bias.is_finite() && self.pacing_bias >= 0.0) {
            return Err(Error::InvalidConfig(format!("pacing_bias must not be negative, got {}", self.pacing_bias)));
        }
        Ok(())
    }
}

/// Turns cell-grid intensity samples into text frames.
#[derive(Debug, Clone)]
pub struct FrameRenderer {
    ramp: GlyphRamp,
    threshold: Threshold,
}

impl FrameRenderer {
    /// Validates `options` and prepares the glyph ramp.
    pub fn new(options: &RenderOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            ramp: GlyphRamp::new(&options.ramp)?,
            threshold: options.threshold,
        })
    }

    pub fn render(&self, grid: GrayImage) -> TextFrame {
        render_text(&grid, &self.ramp, self.threshold).into()
    }
}
