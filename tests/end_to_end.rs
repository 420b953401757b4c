use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

use image::GrayImage;
use vidascii::config::FfmpegConfig;
use vidascii::glyph::Threshold;
use vidascii::pipeline::{AcceleratedPipeline, CpuPipeline, FramePipeline};
use vidascii::player::{self, FrameSink};
use vidascii::reduce::CellGrid;
use vidascii::shutdown::Shutdown;
use vidascii::source::{MemorySource, RawFrame, VideoSource};
use vidascii::{FrameStore, RenderOptions, TextFrame};

fn two_tone_options() -> RenderOptions {
    RenderOptions::serve()
        .with_ramp("@ ")
        .with_columns(2)
        .with_threshold(Threshold::disabled())
        .with_pacing_bias(0.0)
}

fn two_by_two() -> RawFrame {
    RawFrame::Luma(GrayImage::from_raw(2, 2, vec![0, 255, 128, 200]).unwrap())
}

#[test]
fn two_by_two_frames_render_one_row_each() {
    let source = MemorySource::new(vec![two_by_two(), two_by_two()], Some(1000.0)).unwrap();
    let mut frames: Vec<TextFrame> = Vec::new();

    let stats = player::run(source, &CpuPipeline, &two_tone_options(), &mut frames, &Shutdown::new()).unwrap();

    assert_eq!(stats.frames, 2);
    assert_eq!(frames, vec![TextFrame::from("@ "), TextFrame::from("@ ")]);
}

fn ffmpeg_installed() -> bool {
    ["ffmpeg", "ffprobe"].iter().all(|bin| {
        Command::new(bin)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    })
}

fn first_intensity(pipeline: &dyn FramePipeline, clip: &Path, grid: CellGrid) -> GrayImage {
    let mut source = pipeline
        .open_ffmpeg(clip, &FfmpegConfig::default(), grid.columns, 0.55)
        .unwrap();
    let frame = source.next_frame().unwrap().expect("clip has a frame");
    source.release();
    pipeline.intensity(frame, grid)
}

#[test]
fn decoder_scaled_luma_matches_cpu_luma() {
    if !ffmpeg_installed() {
        eprintln!("ffmpeg/ffprobe not installed, skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let clip = dir.path().join("ramp.mkv");
    let status = Command::new("ffmpeg")
        .args(["-loglevel", "error", "-nostdin", "-y", "-f", "lavfi", "-i"])
        .arg("nullsrc=s=320x180:d=0.2,geq=lum='X*255/W':cb=128:cr=128,format=yuv420p")
        .args(["-c:v", "ffv1"])
        .arg(&clip)
        .status()
        .unwrap();
    assert!(status.success());

    let grid = CellGrid::for_frame(320, 180, 40, 0.55).unwrap();
    let cpu = first_intensity(&CpuPipeline, &clip, grid);
    // "auto" falls back to software decode, so this runs on hosts without a GPU.
    let fused = first_intensity(&AcceleratedPipeline::new("auto"), &clip, grid);

    assert_eq!(cpu.dimensions(), (40, 12));
    assert_eq!(fused.dimensions(), cpu.dimensions());
    let total: u64 = cpu
        .as_raw()
        .iter()
        .zip(fused.as_raw())
        .map(|(a, b)| (*a as i32 - *b as i32).unsigned_abs() as u64)
        .sum();
    let mean = total as f64 / cpu.as_raw().len() as f64;
    // Unexpanded limited-range luma is off by about 9 levels on average here.
    assert!(mean < 4.0, "mean luma difference {:.2}", mean);
}

#[test]
fn store_holds_last_frame_after_stream_ends() {
    let store = Arc::new(FrameStore::new());
    let frames = vec![
        RawFrame::Luma(GrayImage::from_pixel(4, 4, image::Luma([0]))),
        RawFrame::Luma(GrayImage::from_pixel(4, 4, image::Luma([255]))),
    ];
    let source = MemorySource::new(frames, Some(500.0)).unwrap();
    let options = two_tone_options().with_columns(4);
    let mut sink = Arc::clone(&store);

    player::run(source, &CpuPipeline, &options, &mut sink, &Shutdown::new()).unwrap();

    let (sequence, latest) = store.read_latest_with_sequence();
    assert_eq!(sequence, 2);
    assert!(latest.as_str().split('\n').all(|row| row == "    "));
}

#[test]
fn shutdown_from_another_thread_stops_the_loop() {
    let frames: Vec<RawFrame> = (0..1000).map(|_| two_by_two()).collect();
    let source = MemorySource::new(frames, Some(10.0)).unwrap();
    let released = source.release_flag();
    let shutdown = Shutdown::new();
    let options = two_tone_options().with_pacing_bias(1.0);

    let worker = {
        let shutdown = shutdown.clone();
        thread::spawn(move || {
            let mut frames: Vec<TextFrame> = Vec::new();
            player::run(source, &CpuPipeline, &options, &mut frames, &shutdown)
        })
    };

    thread::sleep(std::time::Duration::from_millis(250));
    shutdown.trigger();
    let stats = worker.join().unwrap().unwrap();

    assert!(stats.interrupted);
    assert!(stats.frames >= 1 && stats.frames < 1000);
    assert!(released.load(Ordering::SeqCst));
}

struct CountingSink(usize);

impl FrameSink for CountingSink {
    fn present(&mut self, _frame: &TextFrame) -> vidascii::Result<()> {
        self.0 += 1;
        Ok(())
    }
}

#[test]
fn custom_sinks_see_every_frame() {
    let frames: Vec<RawFrame> = (0..7).map(|_| two_by_two()).collect();
    let source = MemorySource::new(frames, Some(1000.0)).unwrap();
    let mut sink = CountingSink(0);

    player::run(source, &CpuPipeline, &two_tone_options(), &mut sink, &Shutdown::new()).unwrap();

    assert_eq!(sink.0, 7);
}
