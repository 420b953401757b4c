//! The capture/render loop.
//!
//! Each tick pulls one frame from a [`VideoSource`], reduces and maps it to a
//! [`TextFrame`], hands the frame to a [`FrameSink`], then sleeps whatever is
//! left of the inter-frame budget. The loop ends on end-of-stream, on a
//! decode failure, or when the [`Shutdown`] token fires; the source is
//! released on every one of those paths.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::pipeline::FramePipeline;
use crate::reduce::CellGrid;
use crate::shutdown::Shutdown;
use crate::source::VideoSource;
use crate::store::{FrameStore, TextFrame};
use crate::{FrameRenderer, RenderOptions};

/// Receives every rendered frame, in order.
pub trait FrameSink {
    fn present(&mut self, frame: &TextFrame) -> Result<()>;
}

impl FrameSink for Arc<FrameStore> {
    fn present(&mut self, frame: &TextFrame) -> Result<()> {
        self.publish(frame.clone());
        Ok(())
    }
}

impl FrameSink for Vec<TextFrame> {
    fn present(&mut self, frame: &TextFrame) -> Result<()> {
        self.push(frame.clone());
        Ok(())
    }
}

impl<K: FrameSink + ?Sized> FrameSink for &mut K {
    fn present(&mut self, frame: &TextFrame) -> Result<()> {
        (**self).present(frame)
    }
}

/// The source's frame rate if usable, otherwise `fallback`.
pub fn resolve_fps(reported: Option<f64>, fallback: f64) -> f64 {
    match reported {
        Some(fps) if fps.is_finite() && fps > 0.0 => fps,
        _ => fallback,
    }
}

/// Paces ticks to `pacing_bias / fps` seconds apart.
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    target_delay: Duration,
    last_tick: Instant,
}

impl PlaybackClock {
    pub fn new(fps: f64, pacing_bias: f64) -> Self {
        let secs = if fps > 0.0 { pacing_bias.max(0.0) / fps } else { 0.0 };
        Self {
            target_delay: Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO),
            last_tick: Instant::now(),
        }
    }

    pub fn target_delay(&self) -> Duration {
        self.target_delay
    }

    /// Sleep still owed after `elapsed` of work: `max(0, delay - elapsed)`.
    pub fn remaining(&self, elapsed: Duration) -> Duration {
        self.target_delay.saturating_sub(elapsed)
    }

    /// Sleeps out the rest of the tick and starts the next one. Returns
    /// `false` if the sleep was cut short by `shutdown`.
    pub fn pace(&mut self, shutdown: &Shutdown) -> bool {
        let wait = self.remaining(self.last_tick.elapsed());
        let completed = wait.is_zero() || shutdown.sleep(wait);
        self.last_tick = Instant::now();
        completed
    }
}

/// Outcome of one playback run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackStats {
    pub frames: u64,
    /// Frame rate the clock was paced against
    pub fps: f64,
    pub interrupted: bool,
}

/// Releases the wrapped source when dropped, including during unwinding.
struct SourceGuard<S: VideoSource>(S);

impl<S: VideoSource> Drop for SourceGuard<S> {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// Plays `source` into `sink` until the stream ends or `shutdown` fires.
pub fn run<S, K>(
    source: S,
    pipeline: &dyn FramePipeline,
    options: &RenderOptions,
    sink: &mut K,
    shutdown: &Shutdown,
) -> Result<PlaybackStats>
where
    S: VideoSource,
    K: FrameSink + ?Sized,
{
    let mut source = SourceGuard(source);
    let renderer = FrameRenderer::new(options)?;

    let (width, height) = source.0.dimensions();
    let fps = resolve_fps(source.0.frame_rate(), options.fallback_fps);
    let grid = CellGrid::for_frame(width, height, options.columns, options.font_ratio)?;
    log::info!(
        "Video FPS: {:.3} ({} pipeline, {}x{} cells)",
        fps,
        pipeline.name(),
        grid.columns,
        grid.rows
    );

    let mut clock = PlaybackClock::new(fps, options.pacing_bias);
    let mut stats = PlaybackStats { frames: 0, fps, interrupted: false };

    loop {
        if shutdown.is_triggered() {
            stats.interrupted = true;
            break;
        }

        let frame = match source.0.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                log::warn!("Stopping playback after decode failure: {}", e);
                break;
            }
        };

        let text = renderer.render(pipeline.intensity(frame, grid));
        sink.present(&text)?;
        stats.frames += 1;
        log::trace!("frame {} presented", stats.frames);

        if !clock.pace(shutdown) {
            stats.interrupted = true;
            break;
        }
    }

    source.0.release();
    log::info!(
        "Playback finished: {} frames{}",
        stats.frames,
        if stats.interrupted { " (interrupted)" } else { "" }
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::glyph::Threshold;
    use crate::pipeline::CpuPipeline;
    use crate::source::{MemorySource, RawFrame};
    use image::GrayImage;
    use rstest::rstest;
    use std::sync::atomic::Ordering;

    fn options() -> RenderOptions {
        RenderOptions::display()
            .with_ramp("@ ")
            .with_columns(2)
            .with_threshold(Threshold::disabled())
            .with_pacing_bias(0.0)
    }

    fn frames(n: usize) -> Vec<RawFrame> {
        (0..n)
            .map(|_| RawFrame::Luma(GrayImage::from_raw(2, 2, vec![0, 255, 128, 200]).unwrap()))
            .collect()
    }

    #[rstest]
    #[case(Some(24.0), 24.0)]
    #[case(Some(0.0), 12.0)]
    #[case(Some(-3.0), 12.0)]
    #[case(Some(f64::NAN), 12.0)]
    #[case(Some(f64::INFINITY), 12.0)]
    #[case(None, 12.0)]
    fn fps_falls_back_when_unusable(#[case] reported: Option<f64>, #[case] expected: f64) {
        assert_eq!(resolve_fps(reported, 12.0), expected);
    }

    #[test]
    fn clock_delay_scales_with_bias() {
        assert_eq!(PlaybackClock::new(10.0, 1.0).target_delay(), Duration::from_millis(100));
        assert_eq!(PlaybackClock::new(10.0, 1.5).target_delay(), Duration::from_millis(150));
        assert_eq!(PlaybackClock::new(10.0, 0.0).target_delay(), Duration::ZERO);
    }

    #[test]
    fn clock_remaining_never_negative() {
        let clock = PlaybackClock::new(10.0, 1.0);
        assert_eq!(clock.remaining(Duration::from_millis(30)), Duration::from_millis(70));
        assert_eq!(clock.remaining(Duration::from_millis(250)), Duration::ZERO);
    }

    #[test]
    fn renders_every_frame_then_releases() {
        let source = MemorySource::new(frames(3), Some(1000.0)).unwrap();
        let released = source.release_flag();
        let mut sink: Vec<TextFrame> = Vec::new();

        let stats = run(source, &CpuPipeline, &options(), &mut sink, &Shutdown::new()).unwrap();

        assert_eq!(stats.frames, 3);
        assert!(!stats.interrupted);
        assert!(sink.iter().all(|f| f.as_str() == "@ "));
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn decode_failure_ends_playback_cleanly() {
        let source = MemorySource::new(frames(1), None).unwrap().then_fail("corrupt packet");
        let released = source.release_flag();
        let mut sink: Vec<TextFrame> = Vec::new();

        let stats = run(source, &CpuPipeline, &options(), &mut sink, &Shutdown::new()).unwrap();

        assert_eq!(stats.frames, 1);
        assert_eq!(stats.fps, 12.0);
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn triggered_shutdown_stops_before_decoding() {
        let source = MemorySource::new(frames(5), Some(30.0)).unwrap();
        let released = source.release_flag();
        let shutdown = Shutdown::new();
        shutdown.trigger();
        let mut sink: Vec<TextFrame> = Vec::new();

        let stats = run(source, &CpuPipeline, &options(), &mut sink, &shutdown).unwrap();

        assert_eq!(stats.frames, 0);
        assert!(stats.interrupted);
        assert!(sink.is_empty());
        assert!(released.load(Ordering::SeqCst));
    }

    struct FailingSink;

    impl FrameSink for FailingSink {
        fn present(&mut self, _frame: &TextFrame) -> Result<()> {
            Err(Error::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed")))
        }
    }

    #[test]
    fn sink_errors_propagate_and_still_release() {
        let source = MemorySource::new(frames(2), Some(30.0)).unwrap();
        let released = source.release_flag();

        let result = run(source, &CpuPipeline, &options(), &mut FailingSink, &Shutdown::new());

        assert!(matches!(result, Err(Error::Io(_))));
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn store_sink_keeps_latest() {
        let store = Arc::new(FrameStore::new());
        let mut sink = Arc::clone(&store);
        let source = MemorySource::new(frames(2), Some(1000.0)).unwrap();

        run(source, &CpuPipeline, &options(), &mut sink, &Shutdown::new()).unwrap();

        assert_eq!(store.read_latest_with_sequence(), (2, TextFrame::from("@ ")));
    }
}
