use clap::Parser;
use std::path::PathBuf;

use crate::config::{self, CaptureMode, ConfigError};

#[derive(Parser, Debug, Clone)]
#[command(name = "capture-pacer")]
#[command(author = "Capture Pacer Team")]
#[command(version)]
#[command(about = "Paced desktop, window and hooked-process capture", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "capture-pacer.toml")]
    pub config: PathBuf,

    /// Capture mode (desktop, inject, gdi, dshow)
    #[arg(short, long)]
    pub mode: Option<CaptureMode>,

    /// Target frame rate
    #[arg(long)]
    pub fps: Option<u32>,

    /// Stop after this many delivered frames
    #[arg(short = 'n', long)]
    pub frames: Option<u64>,

    /// Output width
    #[arg(long)]
    pub width: Option<u32>,

    /// Output height
    #[arg(long)]
    pub height: Option<u32>,

    /// Display to capture from (X11 display, defaults to $DISPLAY)
    #[arg(short, long)]
    pub display: Option<String>,

    /// Do not re-read the configuration file when it changes
    #[arg(long, action)]
    pub no_watch: bool,

    /// Verbose logging
    #[arg(short, long, action)]
    pub verbose: bool,
}

impl Args {
    pub fn load_config(&self) -> Result<config::Config, ConfigError> {
        config::Config::load(&self.config)
    }

    /// Fold command line overrides into a loaded configuration
    pub fn apply_overrides(&self, config: &mut config::Config) {
        if let Some(mode) = self.mode {
            config.capture.mode = mode;
        }
        if let Some(fps) = self.fps {
            config.capture.fps = fps;
        }
        if let Some(width) = self.width {
            config.output.width = width;
        }
        if let Some(height) = self.height {
            config.output.height = height;
        }
    }
}
