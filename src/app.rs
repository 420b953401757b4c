//! Mode wiring: which sink the render loop feeds and which threads run.

use std::path::Path;
use std::sync::Arc;
use std::thread;

use crate::config::{FfmpegConfig, ServeSettings};
use crate::error::{Error, Result};
use crate::pipeline::FramePipeline;
use crate::player::{self, PlaybackStats};
use crate::server;
use crate::shutdown::Shutdown;
use crate::source::{FfmpegSource, VideoSource};
use crate::store::FrameStore;
use crate::terminal::TerminalSink;
use crate::RenderOptions;

/// Rejects paths that are not existing regular files, before anything is opened.
pub fn check_input(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(Error::InputNotFound(path.to_path_buf()))
    }
}

/// Opens `path` for the given pipeline and profile.
pub fn open_video(
    path: &Path,
    pipeline: &dyn FramePipeline,
    ffmpeg: &FfmpegConfig,
    options: &RenderOptions,
) -> Result<FfmpegSource> {
    check_input(path)?;
    pipeline.open_ffmpeg(path, ffmpeg, options.columns, options.font_ratio)
}

/// Display mode: decode, map and print on the calling thread.
pub fn play_in_terminal<S: VideoSource>(
    source: S,
    pipeline: &dyn FramePipeline,
    options: &RenderOptions,
    shutdown: &Shutdown,
) -> Result<PlaybackStats> {
    let mut sink = TerminalSink::stdout()?;
    player::run(source, pipeline, options, &mut sink, shutdown)
}

/// Serve mode: the render loop publishes into a shared store from its own
/// thread while the HTTP server reads it.
///
/// Returns once the server has shut down and the render thread has joined.
/// The server keeps answering with the final frame after the video ends.
pub fn serve<S>(
    source: S,
    pipeline: Box<dyn FramePipeline>,
    settings: &ServeSettings,
    shutdown: &Shutdown,
) -> Result<PlaybackStats>
where
    S: VideoSource + 'static,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("http-worker")
        .build()?;
    let listener = runtime.block_on(server::bind(settings.port))?;

    let store = Arc::new(FrameStore::new());
    let render = {
        let mut sink = Arc::clone(&store);
        let options = settings.render.clone();
        let shutdown = shutdown.clone();
        thread::Builder::new()
            .name("render-loop".into())
            .spawn(move || player::run(source, pipeline.as_ref(), &options, &mut sink, &shutdown))?
    };

    let served = runtime.block_on(server::serve(
        listener,
        Arc::clone(&store),
        settings.poll_interval_ms,
        shutdown.clone(),
    ));

    shutdown.trigger();
    let stats = render
        .join()
        .map_err(|_| Error::Server("render thread panicked".into()))?;
    served?;
    stats
}
