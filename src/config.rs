//! Configuration file handling.
//!
//! Settings come from `vidascii.toml`, looked up at an explicit path, then
//! in the user config directory, then in the working directory. Missing keys
//! fall back to the built-in display and serve profiles.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::glyph::Threshold;
use crate::RenderOptions;

pub const CONFIG_FILE_NAME: &str = "vidascii.toml";

/// Whether the decoder may use a hardware acceleration method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HwAccel {
    #[default]
    Auto,
    Off,
}

/// Locations of the external decoder binaries.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FfmpegConfig {
    pub ffmpeg: Option<PathBuf>,
    pub ffprobe: Option<PathBuf>,
    pub hwaccel: HwAccel,
}

impl FfmpegConfig {
    pub fn ffmpeg_cmd(&self) -> &OsStr {
        self.ffmpeg.as_deref().map(Path::as_os_str).unwrap_or(OsStr::new("ffmpeg"))
    }

    pub fn ffprobe_cmd(&self) -> &OsStr {
        self.ffprobe.as_deref().map(Path::as_os_str).unwrap_or(OsStr::new("ffprobe"))
    }
}

/// Serve-mode settings: a render profile plus the HTTP surface.
#[derive(Debug, Clone, PartialEq)]
pub struct ServeSettings {
    pub render: RenderOptions,
    pub port: u16,
    /// Client-side polling interval baked into the HTML page
    pub poll_interval_ms: u64,
}

impl Default for ServeSettings {
    fn default() -> Self {
        Self {
            render: RenderOptions::serve(),
            port: 8080,
            poll_interval_ms: 80,
        }
    }
}

/// Fully resolved application configuration.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub display: RenderOptions,
    pub serve: ServeSettings,
    pub ffmpeg: FfmpegConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProfileOverrides {
    ramp: Option<String>,
    columns: Option<u32>,
    font_ratio: Option<f32>,
    threshold: Option<Threshold>,
    fallback_fps: Option<f64>,
    pacing_bias: Option<f64>,
}

impl ProfileOverrides {
    fn apply(self, mut base: RenderOptions) -> RenderOptions {
        if let Some(ramp) = self.ramp {
            base.ramp = ramp;
        }
        if let Some(columns) = self.columns {
            base.columns = columns;
        }
        if let Some(font_ratio) = self.font_ratio {
            base.font_ratio = font_ratio;
        }
        if let Some(threshold) = self.threshold {
            base.threshold = threshold;
        }
        if let Some(fps) = self.fallback_fps {
            base.fallback_fps = fps;
        }
        if let Some(bias) = self.pacing_bias {
            base.pacing_bias = bias;
        }
        base
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ServeOverrides {
    #[serde(flatten)]
    render: ProfileOverrides,
    port: Option<u16>,
    poll_interval_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    display: ProfileOverrides,
    serve: ServeOverrides,
    ffmpeg: FfmpegConfig,
}

impl AppConfig {
    /// Parses TOML text on top of the built-in profiles.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(text).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        let defaults = ServeSettings::default();

        let config = Self {
            display: file.display.apply(RenderOptions::display()),
            serve: ServeSettings {
                render: file.serve.render.apply(defaults.render),
                port: file.serve.port.unwrap_or(defaults.port),
                poll_interval_ms: file.serve.poll_interval_ms.unwrap_or(defaults.poll_interval_ms),
            },
            ffmpeg: file.ffmpeg,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::InvalidConfig(format!("reading config {}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
            .map_err(|e| Error::InvalidConfig(format!("{}: {}", path.display(), e)))
    }

    /// Loads the first config found, or the built-in defaults.
    ///
    /// An explicit path must exist; the implicit locations are optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        let mut tried: Vec<PathBuf> = Vec::new();
        if let Some(mut d) = dirs::config_dir() {
            d.push("vidascii");
            d.push(CONFIG_FILE_NAME);
            tried.push(d);
        }
        tried.push(PathBuf::from(CONFIG_FILE_NAME));

        for p in &tried {
            if p.is_file() {
                log::info!("Using config {}", p.display());
                return Self::from_file(p);
            }
        }

        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<()> {
        self.display.validate()?;
        self.serve.render.validate()?;
        if self.serve.poll_interval_ms == 0 {
            return Err(Error::InvalidConfig("serve.poll_interval_ms must be positive".into()));
        }
        Ok(())
    }
}
