//! Frame pipeline strategies.
//!
//! Both strategies produce the same intensity grid; they differ in where the
//! luma conversion and the resize happen. [`CpuPipeline`] decodes full RGB
//! frames and converts them here. [`AcceleratedPipeline`] asks the decoder to
//! emit full-range luma already scaled to the cell grid, decoding on a
//! hardware device. The choice is made once at startup by
//! [`select_pipeline`], which only picks the accelerated path when a device
//! for one of the compiled-in methods can actually be opened.

use std::path::Path;
use std::process::{Command as ProcCommand, Stdio};

use image::GrayImage;

use crate::config::{FfmpegConfig, HwAccel};
use crate::error::Result;
use crate::reduce::{resize_to, CellGrid};
use crate::source::{DecodeFormat, FfmpegSource, RawFrame};

pub trait FramePipeline: Send + Sync {
    fn name(&self) -> &'static str;

    /// Hardware decode method passed to `-hwaccel`, if any.
    fn hwaccel(&self) -> Option<&str>;

    fn is_accelerated(&self) -> bool {
        self.hwaccel().is_some()
    }

    /// Pixel layout the decoder should produce for a video mapped onto `grid`.
    fn decode_format(&self, grid: CellGrid) -> DecodeFormat;

    /// Turns a decoded frame into exactly `grid`-sized luma samples.
    fn intensity(&self, frame: RawFrame, grid: CellGrid) -> GrayImage {
        resize_to(&frame.into_luma(), grid.columns, grid.rows)
    }

    /// Opens `path` with `ffmpeg` configured for this strategy.
    fn open_ffmpeg(&self, path: &Path, ffmpeg: &FfmpegConfig, columns: u32, font_ratio: f32) -> Result<FfmpegSource> {
        FfmpegSource::open(path, ffmpeg, self.hwaccel(), |info| {
            let grid = CellGrid::for_frame(info.width, info.height, columns, font_ratio)?;
            Ok(self.decode_format(grid))
        })
    }
}

/// Full-resolution RGB decode; luma and resize run on the CPU.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuPipeline;

impl FramePipeline for CpuPipeline {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn hwaccel(&self) -> Option<&str> {
        None
    }

    fn decode_format(&self, _grid: CellGrid) -> DecodeFormat {
        DecodeFormat::Rgb24
    }
}

/// Hardware decode with luma conversion and bilinear resize fused into the
/// decoder's filter graph.
#[derive(Debug, Clone)]
pub struct AcceleratedPipeline {
    method: String,
}

impl AcceleratedPipeline {
    pub fn new(method: impl Into<String>) -> Self {
        Self { method: method.into() }
    }
}

impl FramePipeline for AcceleratedPipeline {
    fn name(&self) -> &'static str {
        "accelerated"
    }

    fn hwaccel(&self) -> Option<&str> {
        Some(&self.method)
    }

    fn decode_format(&self, grid: CellGrid) -> DecodeFormat {
        DecodeFormat::Gray { width: grid.columns, height: grid.rows }
    }
}

/// Lists the hardware acceleration methods the local `ffmpeg` was built with.
pub fn probe_hwaccels(ffmpeg: &FfmpegConfig) -> Result<Vec<String>> {
    let output = ProcCommand::new(ffmpeg.ffmpeg_cmd())
        .args(["-hide_banner", "-hwaccels"])
        .stdin(Stdio::null())
        .output()?;
    Ok(parse_hwaccels(&String::from_utf8_lossy(&output.stdout)))
}

/// Parses the output of `ffmpeg -hwaccels`.
pub fn parse_hwaccels(text: &str) -> Vec<String> {
    text.lines()
        .skip_while(|line| !line.trim_start().starts_with("Hardware acceleration methods"))
        .skip(1)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

/// Whether a device for `method` can be opened. `-hwaccels` only lists what
/// ffmpeg was built with, so this initializes the device on a one-frame
/// synthetic input.
pub fn hwaccel_device_available(ffmpeg: &FfmpegConfig, method: &str) -> bool {
    let status = ProcCommand::new(ffmpeg.ffmpeg_cmd())
        .args(["-hide_banner", "-loglevel", "quiet", "-nostdin"])
        .args(["-init_hw_device", method])
        .args(["-f", "lavfi", "-i", "nullsrc=s=16x16", "-frames:v", "1", "-f", "null", "-"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    matches!(status, Ok(s) if s.success())
}

/// First listed method whose device passes `usable`.
pub fn choose_hwaccel<F>(methods: &[String], mut usable: F) -> Option<String>
where
    F: FnMut(&str) -> bool,
{
    methods.iter().find(|m| usable(m.as_str())).cloned()
}

/// Chooses the pipeline once, from an explicit capability check.
pub fn select_pipeline(ffmpeg: &FfmpegConfig) -> Box<dyn FramePipeline> {
    if ffmpeg.hwaccel == HwAccel::Off {
        log::info!("Using hardware acceleration: false (disabled in config)");
        return Box::new(CpuPipeline);
    }

    let methods = match probe_hwaccels(ffmpeg) {
        Ok(methods) => methods,
        Err(e) => {
            log::debug!("hwaccel probe failed: {}", e);
            Vec::new()
        }
    };
    log::debug!("ffmpeg hwaccel methods: [{}]", methods.join(", "));

    match choose_hwaccel(&methods, |m| hwaccel_device_available(ffmpeg, m)) {
        Some(method) => {
            log::info!("Using hardware acceleration: true ({})", method);
            Box::new(AcceleratedPipeline::new(method))
        }
        None => {
            log::info!("Using hardware acceleration: false");
            Box::new(CpuPipeline)
        }
    }
}
