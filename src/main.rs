use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use std::path::PathBuf;
use std::process::ExitCode;
use vidascii::app;
use vidascii::config::AppConfig;
use vidascii::glyph::Threshold;
use vidascii::pipeline::select_pipeline;
use vidascii::shutdown::Shutdown;
use vidascii::Error;

#[derive(Parser, Debug)]
#[command(version, about = "Play a video as ASCII art in the terminal or in a browser.")]
struct Args {
    /// Video file to play
    video_path: Option<PathBuf>,

    /// Stream frames over HTTP instead of printing them
    #[arg(long, default_value_t = false)]
    serve: bool,

    /// Port for --serve
    #[arg(long)]
    port: Option<u16>,

    /// Target columns (width) of the character grid
    #[arg(long)]
    columns: Option<u32>,

    /// Render dark pixels with the ramp instead of blanking them
    #[arg(long, default_value_t = false)]
    no_threshold: bool,

    /// Config file to use instead of the default search locations
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Terminal playback shares the screen with the log, so it stays quiet unless
/// `RUST_LOG` asks otherwise.
fn default_log_filter(serve: bool) -> &'static str {
    if serve {
        "info"
    } else {
        "warn"
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_log_filter(args.serve)))
        .init();

    let Some(video_path) = args.video_path.clone() else {
        eprintln!("{}", Args::command().render_usage());
        eprintln!("Error: {}", Error::MissingInput);
        return ExitCode::from(1);
    };

    match run(&args, video_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

fn run(args: &Args, video_path: PathBuf) -> Result<()> {
    // Checked before config and pipeline probing so no handle is ever opened.
    app::check_input(&video_path)?;

    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(columns) = args.columns {
        config.display.columns = columns;
        config.serve.render.columns = columns;
    }
    if args.no_threshold {
        config.display.threshold = Threshold::disabled();
        config.serve.render.threshold = Threshold::disabled();
    }
    if let Some(port) = args.port {
        config.serve.port = port;
    }
    config.validate()?;

    let shutdown = Shutdown::new();
    shutdown
        .install_ctrlc_handler()
        .context("installing Ctrl-C handler")?;

    let pipeline = select_pipeline(&config.ffmpeg);

    let stats = if args.serve {
        let settings = &config.serve;
        let source = app::open_video(&video_path, pipeline.as_ref(), &config.ffmpeg, &settings.render)?;
        app::serve(source, pipeline, settings, &shutdown)?
    } else {
        let options = &config.display;
        let source = app::open_video(&video_path, pipeline.as_ref(), &config.ffmpeg, options)?;
        app::play_in_terminal(source, pipeline.as_ref(), options, &shutdown)?
    };

    log::info!(
        "Rendered {} frames at {:.2} fps{}",
        stats.frames,
        stats.fps,
        if stats.interrupted { ", stopped by interrupt" } else { "" }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_mode_keeps_info_off_the_screen() {
        assert_eq!(default_log_filter(false), "warn");
        assert_eq!(default_log_filter(true), "info");
    }

    #[test]
    fn flags_parse() {
        let args = Args::try_parse_from(["vidascii", "clip.mp4", "--serve", "--port", "9000", "--no-threshold"]).unwrap();
        assert!(args.serve);
        assert!(args.no_threshold);
        assert_eq!(args.port, Some(9000));
        assert_eq!(args.video_path, Some(PathBuf::from("clip.mp4")));
    }
}
