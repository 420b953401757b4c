use std::path::PathBuf;

/// Errors produced by the rendering pipeline and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No video path was given on the command line
    #[error("no input video given")]
    MissingInput,

    #[error("File '{}' does not exist.", .0.display())]
    InputNotFound(PathBuf),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("ffmpeg not found. Install it or point `ffmpeg.ffmpeg` / `ffmpeg.ffprobe` at the binaries")]
    FfmpegNotFound,

    /// The video could not be opened; the render loop never started
    #[error("cannot open video {}: {reason}", path.display())]
    SourceOpen { path: PathBuf, reason: String },

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("http server: {0}")]
    Server(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error stems from user input rather than the environment.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::MissingInput | Error::InputNotFound(_) | Error::InvalidConfig(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
