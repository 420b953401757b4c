//! Video sources: the decode side of the render loop.
//!
//! [`FfmpegSource`] shells out to `ffprobe` for stream metadata and to
//! `ffmpeg` for decoding, reading fixed-size `rawvideo` frames from its
//! stdout. [`MemorySource`] replays frames held in memory.

use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command as ProcCommand, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use image::{GrayImage, RgbImage};

use crate::config::FfmpegConfig;
use crate::error::{Error, Result};

/// A decoded frame, owned by the render loop for a single tick.
#[derive(Debug, Clone)]
pub enum RawFrame {
    /// Full-resolution RGB samples
    Rgb(RgbImage),
    /// Single-channel samples, possibly already reduced by the decoder
    Luma(GrayImage),
}

impl RawFrame {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            RawFrame::Rgb(img) => img.dimensions(),
            RawFrame::Luma(img) => img.dimensions(),
        }
    }

    /// Converts to single-channel luma; luma frames pass through untouched.
    pub fn into_luma(self) -> GrayImage {
        match self {
            RawFrame::Rgb(img) => image::imageops::grayscale(&img),
            RawFrame::Luma(img) => img,
        }
    }
}

/// Stream properties reported when a source is opened.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    /// Nominal frame rate, `None` when the container does not report one
    pub fps: Option<f64>,
}

/// Capability consumed by the render loop.
pub trait VideoSource: Send {
    fn info(&self) -> &VideoInfo;

    fn frame_rate(&self) -> Option<f64> {
        self.info().fps
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.info().width, self.info().height)
    }

    /// The next frame in decode order, `Ok(None)` at end of stream.
    fn next_frame(&mut self) -> Result<Option<RawFrame>>;

    /// Releases the underlying handle. Must be idempotent.
    fn release(&mut self);
}

impl<S: VideoSource + ?Sized> VideoSource for Box<S> {
    fn info(&self) -> &VideoInfo {
        (**self).info()
    }

    fn frame_rate(&self) -> Option<f64> {
        (**self).frame_rate()
    }

    fn dimensions(&self) -> (u32, u32) {
        (**self).dimensions()
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        (**self).next_frame()
    }

    fn release(&mut self) {
        (**self).release()
    }
}

/// Pixel layout requested from the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeFormat {
    /// Native resolution, packed RGB
    Rgb24,
    /// Luma scaled by the decoder to `width`×`height`
    Gray { width: u32, height: u32 },
}

impl DecodeFormat {
    fn frame_len(&self, info: &VideoInfo) -> usize {
        match *self {
            DecodeFormat::Rgb24 => info.width as usize * info.height as usize * 3,
            DecodeFormat::Gray { width, height } => width as usize * height as usize,
        }
    }
}

/// Queries stream metadata with `ffprobe`.
pub fn probe_video(path: &Path, ffmpeg: &FfmpegConfig) -> Result<VideoInfo> {
    let output = ProcCommand::new(ffmpeg.ffprobe_cmd())
        .args(["-v", "error", "-select_streams", "v:0"])
        .args([
            "-show_entries",
            "stream=width,height,avg_frame_rate,r_frame_rate:stream_tags=rotate:stream_side_data=rotation",
        ])
        .args(["-of", "default=noprint_wrappers=1"])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| spawn_error(e, path))?;

    if !output.status.success() {
        return Err(Error::SourceOpen {
            path: path.to_path_buf(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    parse_probe_output(&String::from_utf8_lossy(&output.stdout)).map_err(|reason| Error::SourceOpen {
        path: path.to_path_buf(),
        reason,
    })
}

/// Parses `key=value` lines as printed by `ffprobe -of default=noprint_wrappers=1`.
///
/// `width`/`height` are the stored size. ffmpeg applies the rotation from the
/// display matrix (`rotation=`) or the legacy `TAG:rotate=` before output, so
/// a quarter turn swaps the reported dimensions. `avg_frame_rate` wins over
/// `r_frame_rate`, which can be a timebase for variable-rate streams.
pub fn parse_probe_output(text: &str) -> std::result::Result<VideoInfo, String> {
    let mut width = None;
    let mut height = None;
    let mut avg_rate = None;
    let mut base_rate = None;
    let mut rotation = 0i64;

    for line in text.lines() {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        match key {
            "width" => width = value.parse::<u32>().ok(),
            "height" => height = value.parse::<u32>().ok(),
            "avg_frame_rate" => avg_rate = parse_rate(value),
            "r_frame_rate" => base_rate = parse_rate(value),
            "rotation" | "TAG:rotate" => {
                if let Ok(degrees) = value.trim().parse::<f64>() {
                    rotation = degrees.round() as i64;
                }
            }
            _ => {}
        }
    }

    match (width, height) {
        (Some(width), Some(height)) if width > 0 && height > 0 => {
            let (width, height) = if rotation.rem_euclid(180) == 90 {
                (height, width)
            } else {
                (width, height)
            };
            Ok(VideoInfo { width, height, fps: avg_rate.or(base_rate) })
        }
        _ => Err("no video stream found".to_string()),
    }
}

/// Parses `num/den` or a plain number. Zero, negative or non-finite rates are
/// reported as unavailable.
fn parse_rate(value: &str) -> Option<f64> {
    let rate = match value.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => value.trim().parse().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

/// Builds the decoder argument list for `path`.
///
/// Both layouts come out full range: `rgb24` always is, and the gray path
/// expands limited-range luma so both pipelines see the same levels.
pub fn decode_args(path: &Path, format: DecodeFormat, hwaccel: Option<&str>) -> Vec<String> {
    let mut args: Vec<String> = vec!["-loglevel".into(), "error".into(), "-nostdin".into()];
    if let Some(method) = hwaccel {
        args.push("-hwaccel".into());
        args.push(method.into());
    }
    args.push("-i".into());
    args.push(path.to_string_lossy().into_owned());
    args.push("-an".into());

    match format {
        DecodeFormat::Rgb24 => {
            args.extend(["-f", "rawvideo", "-pix_fmt", "rgb24"].map(String::from));
        }
        DecodeFormat::Gray { width, height } => {
            args.push("-vf".into());
            args.push(format!(
                "scale={}:{}:flags=bilinear:in_range=auto:out_range=full,format=gray",
                width, height
            ));
            args.extend(["-f", "rawvideo", "-pix_fmt", "gray"].map(String::from));
        }
    }
    args.push("pipe:1".into());
    args
}

fn spawn_error(e: io::Error, path: &Path) -> Error {
    if e.kind() == io::ErrorKind::NotFound {
        Error::FfmpegNotFound
    } else {
        Error::SourceOpen { path: path.to_path_buf(), reason: e.to_string() }
    }
}

/// Decodes a video file through an `ffmpeg` child process.
pub struct FfmpegSource {
    path: PathBuf,
    info: VideoInfo,
    format: DecodeFormat,
    child: Option<Child>,
    stdout: Option<BufReader<ChildStdout>>,
    stderr_thread: Option<JoinHandle<()>>,
    buffer: Vec<u8>,
}

impl FfmpegSource {
    /// Probes `path` and starts decoding it in the layout chosen by `format`.
    pub fn open(
        path: &Path,
        ffmpeg: &FfmpegConfig,
        hwaccel: Option<&str>,
        format: impl FnOnce(&VideoInfo) -> Result<DecodeFormat>,
    ) -> Result<Self> {
        let info = probe_video(path, ffmpeg)?;
        let format = format(&info)?;
        log::info!(
            "Opened {} ({}x{}, reported fps: {})",
            path.display(),
            info.width,
            info.height,
            info.fps.map(|f| format!("{:.3}", f)).unwrap_or_else(|| "unavailable".into())
        );

        let mut child = ProcCommand::new(ffmpeg.ffmpeg_cmd())
            .args(decode_args(path, format, hwaccel))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(e, path))?;

        let stdout = match child.stdout.take() {
            Some(out) => BufReader::with_capacity(format.frame_len(&info).max(8192), out),
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::SourceOpen {
                    path: path.to_path_buf(),
                    reason: "ffmpeg stdout not available".into(),
                });
            }
        };

        let stderr_thread = child.stderr.take().map(|stderr| {
            thread::spawn(move || {
                for line in BufReader::new(stderr).lines() {
                    match line {
                        Ok(l) if !l.trim().is_empty() => log::warn!("[ffmpeg] {}", l),
                        Ok(_) => {}
                        Err(_) => break,
                    }
                }
            })
        });

        Ok(Self {
            path: path.to_path_buf(),
            buffer: vec![0u8; format.frame_len(&info)],
            info,
            format,
            child: Some(child),
            stdout: Some(stdout),
            stderr_thread,
        })
    }
}

impl VideoSource for FfmpegSource {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };

        match stdout.read_exact(&mut self.buffer) {
            Ok(()) => {}
            // A short trailing read is a truncated frame; drop it.
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(Error::Decode(e.to_string())),
        }

        let data = self.buffer.clone();
        let frame = match self.format {
            DecodeFormat::Rgb24 => RgbImage::from_raw(self.info.width, self.info.height, data).map(RawFrame::Rgb),
            DecodeFormat::Gray { width, height } => GrayImage::from_raw(width, height, data).map(RawFrame::Luma),
        };
        frame
            .map(Some)
            .ok_or_else(|| Error::Decode("frame buffer does not match stream size".into()))
    }

    fn release(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            // Ignore errors: the process may already have exited on its own.
            let _ = child.kill();
            let _ = child.wait();
            log::debug!("Released decoder for {}", self.path.display());
        }
        if let Some(handle) = self.stderr_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.release();
    }
}

/// Replays a fixed list of frames. Decode failures can be scripted with
/// [`MemorySource::then_fail`].
pub struct MemorySource {
    info: VideoInfo,
    frames: VecDeque<Result<RawFrame>>,
    released: Arc<AtomicBool>,
}

impl MemorySource {
    /// `frames` must be non-empty; stream dimensions come from the first frame.
    pub fn new(frames: Vec<RawFrame>, fps: Option<f64>) -> Result<Self> {
        let (width, height) = frames
            .first()
            .map(RawFrame::dimensions)
            .ok_or_else(|| Error::SourceOpen {
                path: PathBuf::from("<memory>"),
                reason: "no frames".into(),
            })?;
        Ok(Self {
            info: VideoInfo { width, height, fps },
            frames: frames.into_iter().map(Ok).collect(),
            released: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Appends a decode error after the queued frames.
    pub fn then_fail(mut self, message: &str) -> Self {
        self.frames.push_back(Err(Error::Decode(message.to_string())));
        self
    }

    /// Flag that flips to `true` once the source is released.
    pub fn release_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.released)
    }
}

impl VideoSource for MemorySource {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        if self.released.load(Ordering::SeqCst) {
            return Ok(None);
        }
        self.frames.pop_front().transpose()
    }

    fn release(&mut self) {
        self.frames.clear();
        self.released.store(true, Ordering::SeqCst);
    }
}
