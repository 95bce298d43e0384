//! Configuration management for capture-pacer

use crate::capture::desktop::DEFAULT_MAX_RETRY;
use crate::window::{CaptureTarget, MatchMode, WindowId};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub mod source;

pub use source::{ConfigSource, FileConfigSource, SharedConfigSource};

/// Key/value configuration snapshot as handed over by the host
pub type Snapshot = BTreeMap<String, String>;

pub const KEY_CAPTURE_TYPE: &str = "capture_type";
pub const KEY_CAPTURE_FPS: &str = "capture_fps";
pub const KEY_CAPTURE_ID: &str = "capture_id";
pub const KEY_WINDOW_CLASS: &str = "window_class";
pub const KEY_WINDOW_NAME: &str = "window_name";
pub const KEY_EXE_PATH: &str = "exe_path";
pub const KEY_WINDOW_HANDLE: &str = "window_handle";
pub const KEY_ANTI_CHEAT: &str = "anti_cheat";
pub const KEY_CAPTURE_ONCE: &str = "capture_once";

/// Configuration failures
#[derive(Debug)]
pub enum ConfigError {
    /// Reading the file failed
    Io(std::io::Error),
    /// The file or payload is not valid TOML/JSON
    Parse(String),
    /// Values parse but are not usable
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "Failed to read configuration: {}", err),
            ConfigError::Parse(msg) => write!(f, "Failed to parse configuration: {}", msg),
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

/// Capture source selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    #[default]
    Desktop,
    Inject,
    Gdi,
    /// Reserved, no backend
    DShow,
}

impl CaptureMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureMode::Desktop => "desktop",
            CaptureMode::Inject => "inject",
            CaptureMode::Gdi => "gdi",
            CaptureMode::DShow => "dshow",
        }
    }
}

impl FromStr for CaptureMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "desktop" => Ok(CaptureMode::Desktop),
            "inject" => Ok(CaptureMode::Inject),
            "gdi" => Ok(CaptureMode::Gdi),
            "dshow" => Ok(CaptureMode::DShow),
            other => Err(ConfigError::Invalid(format!("unknown capture type {:?}", other))),
        }
    }
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Capture source configuration
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Output frame configuration
    #[serde(default)]
    pub output: OutputConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Capture mode
    #[serde(default)]
    pub mode: CaptureMode,

    /// Target frame rate
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Display adapter index (desktop mode)
    #[serde(default)]
    pub adapter: u32,

    /// Output index on the adapter (desktop mode)
    #[serde(default)]
    pub desktop: u32,

    /// Target window class name
    #[serde(default)]
    pub window_class: String,

    /// Target window title
    #[serde(default)]
    pub window_name: String,

    /// Full path of the target executable
    #[serde(default)]
    pub exe_path: String,

    /// Target window handle
    #[serde(default)]
    pub window_handle: Option<u64>,

    /// Use the anti-cheat compatible hook
    #[serde(default)]
    pub anti_cheat: bool,

    /// Capture the bound window only, stop when it goes away
    #[serde(default)]
    pub capture_once: bool,

    /// Desktop duplication initialization attempts
    #[serde(default = "default_max_retry")]
    pub max_retry: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output width in pixels
    pub width: u32,

    /// Output height in pixels
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            mode: CaptureMode::Desktop,
            fps: default_fps(),
            adapter: 0,
            desktop: 0,
            window_class: String::new(),
            window_name: String::new(),
            exe_path: String::new(),
            window_handle: None,
            anti_cheat: false,
            capture_once: false,
            max_retry: default_max_retry(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Settings that differ from `running` but only take effect on restart
    pub fn restart_only_changes(&self, running: &Config) -> Vec<String> {
        let mut changes = Vec::new();
        if self.output != running.output {
            changes.push(format!(
                "output {}x{} -> {}x{}",
                running.output.width, running.output.height, self.output.width, self.output.height
            ));
        }
        if self.logging.level != running.logging.level {
            changes.push(format!(
                "logging level {} -> {}",
                running.logging.level, self.logging.level
            ));
        }
        changes
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.output.width == 0 || self.output.height == 0 {
            return Err(ConfigError::Invalid("Output dimensions must be non-zero".into()));
        }

        if self.capture.fps == 0 {
            return Err(ConfigError::Invalid("Capture FPS must be non-zero".into()));
        }

        if self.capture.max_retry == 0 {
            return Err(ConfigError::Invalid("Desktop max_retry must be non-zero".into()));
        }

        Ok(())
    }
}

impl CaptureConfig {
    /// Capture target derived from the window settings
    ///
    /// An executable path selects class + exe matching, a class name selects
    /// class + title matching, a bare handle selects that handle only.
    pub fn target(&self) -> CaptureTarget {
        let handle = self.window_handle.filter(|h| *h != 0).map(WindowId);
        let match_mode = if !self.exe_path.is_empty() {
            MatchMode::ClassTitleExeAndHandle
        } else if !self.window_class.is_empty() || handle.is_none() {
            MatchMode::ClassAndTitle
        } else {
            MatchMode::HandleOnly
        };

        CaptureTarget {
            match_mode,
            handle,
            class_name: self.window_class.clone(),
            title: self.window_name.clone(),
            executable: (!self.exe_path.is_empty()).then(|| PathBuf::from(&self.exe_path)),
            require_exact_handle: self.capture_once && handle.is_some(),
        }
    }

    /// Current values as a key/value snapshot
    pub fn to_snapshot(&self) -> Snapshot {
        let mut snapshot = Snapshot::new();
        snapshot.insert(KEY_CAPTURE_TYPE.into(), self.mode.as_str().into());
        snapshot.insert(KEY_CAPTURE_FPS.into(), self.fps.to_string());
        snapshot.insert(
            KEY_CAPTURE_ID.into(),
            format!("{}:{}:{}", self.mode, self.adapter, self.desktop),
        );
        snapshot.insert(KEY_WINDOW_CLASS.into(), self.window_class.clone());
        snapshot.insert(KEY_WINDOW_NAME.into(), self.window_name.clone());
        snapshot.insert(KEY_EXE_PATH.into(), self.exe_path.clone());
        snapshot.insert(
            KEY_WINDOW_HANDLE.into(),
            self.window_handle.unwrap_or(0).to_string(),
        );
        snapshot.insert(KEY_ANTI_CHEAT.into(), flag_str(self.anti_cheat).into());
        snapshot.insert(KEY_CAPTURE_ONCE.into(), flag_str(self.capture_once).into());
        snapshot
    }

    /// Apply recognized keys from `snapshot`; returns the number of fields
    /// that changed
    ///
    /// Keys that are absent leave their field alone. Values that fail to
    /// parse are logged and ignored.
    pub fn apply_snapshot(&mut self, snapshot: &Snapshot) -> usize {
        let mut changes = 0;

        match parsed::<u32>(snapshot, KEY_CAPTURE_FPS) {
            Some(0) => warn!("Ignoring {}=0", KEY_CAPTURE_FPS),
            Some(fps) if fps != self.fps => {
                info!("CaptureFPS: {}", fps);
                self.fps = fps;
                changes += 1;
            }
            _ => {}
        }

        if let Some(mode) = parsed::<CaptureMode>(snapshot, KEY_CAPTURE_TYPE) {
            if mode != self.mode {
                info!("CaptureType: {}", mode);
                self.mode = mode;
                changes += 1;
            }
        }

        if let Some(value) = snapshot.get(KEY_CAPTURE_ID) {
            match parse_capture_id(value) {
                Some((kind, adapter, desktop)) => {
                    let old = (self.adapter, self.desktop);
                    if kind == "desktop" {
                        self.adapter = adapter.unwrap_or(self.adapter);
                        self.desktop = desktop.unwrap_or(self.desktop);
                    }
                    if old != (self.adapter, self.desktop) {
                        info!("CaptureId: {}", value);
                        changes += 1;
                    }
                }
                None => warn!("Ignoring malformed {}={:?}", KEY_CAPTURE_ID, value),
            }
        }

        changes += update_string(&mut self.window_name, snapshot, KEY_WINDOW_NAME);
        changes += update_string(&mut self.window_class, snapshot, KEY_WINDOW_CLASS);
        changes += update_string(&mut self.exe_path, snapshot, KEY_EXE_PATH);

        if let Some(handle) = parsed::<u64>(snapshot, KEY_WINDOW_HANDLE) {
            let handle = (handle != 0).then_some(handle);
            if handle != self.window_handle {
                info!("CaptureWindowHandle: {:?}", handle);
                self.window_handle = handle;
                changes += 1;
            }
        }

        if let Some(anti_cheat) = flag(snapshot, KEY_ANTI_CHEAT) {
            if anti_cheat != self.anti_cheat {
                info!("CaptureAntiCheat: {}", anti_cheat);
                self.anti_cheat = anti_cheat;
                changes += 1;
            }
        }

        if let Some(capture_once) = flag(snapshot, KEY_CAPTURE_ONCE) {
            if capture_once != self.capture_once {
                info!("CaptureOnce: {}", capture_once);
                self.capture_once = capture_once;
                changes += 1;
            }
        }

        changes
    }
}

fn parsed<T: FromStr>(snapshot: &Snapshot, key: &str) -> Option<T> {
    let raw = snapshot.get(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring invalid {}={:?}", key, raw);
            None
        }
    }
}

fn flag(snapshot: &Snapshot, key: &str) -> Option<bool> {
    let raw = snapshot.get(key)?;
    match raw.trim() {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => {
            warn!("Ignoring invalid {}={:?}", key, raw);
            None
        }
    }
}

fn flag_str(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

fn update_string(field: &mut String, snapshot: &Snapshot, key: &str) -> usize {
    match snapshot.get(key) {
        Some(value) if value != field => {
            info!("{}: {:?}", key, value);
            *field = value.clone();
            1
        }
        _ => 0,
    }
}

/// `mode:adapter:desktop`; missing indices stay `None`
fn parse_capture_id(value: &str) -> Option<(&str, Option<u32>, Option<u32>)> {
    let mut parts = value.split(':');
    let kind = parts.next().filter(|k| !k.is_empty())?;
    let adapter = match parts.next() {
        Some(raw) => Some(raw.trim().parse().ok()?),
        None => None,
    };
    let desktop = match parts.next() {
        Some(raw) => Some(raw.trim().parse().ok()?),
        None => None,
    };
    Some((kind, adapter, desktop))
}

fn default_fps() -> u32 {
    30
}

fn default_max_retry() -> u32 {
    DEFAULT_MAX_RETRY
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(pairs: &[(&str, &str)]) -> Snapshot {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn validate_rejects_invalid_dimensions() {
        let mut cfg = Config::default();
        cfg.output.width = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_fps() {
        let mut cfg = Config::default();
        cfg.capture.fps = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn parses_toml_sections() {
        let cfg: Config = toml::from_str(
            r#"
            [capture]
            mode = "gdi"
            fps = 60
            window_class = "Notepad"

            [output]
            width = 1280
            height = 720
            "#,
        )
        .unwrap();
        assert_eq!(cfg.capture.mode, CaptureMode::Gdi);
        assert_eq!(cfg.capture.fps, 60);
        assert_eq!(cfg.capture.max_retry, DEFAULT_MAX_RETRY);
        assert_eq!(cfg.output.width, 1280);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn apply_counts_changes() {
        let mut cfg = CaptureConfig::default();
        let changes = cfg.apply_snapshot(&snapshot(&[
            ("capture_type", "gdi"),
            ("capture_fps", "60"),
            ("window_class", "Game"),
            ("anti_cheat", "1"),
        ]));
        assert_eq!(changes, 4);
        assert_eq!(cfg.mode, CaptureMode::Gdi);

        // same values again: nothing changed
        let changes = cfg.apply_snapshot(&cfg.to_snapshot());
        assert_eq!(changes, 0);
    }

    #[test]
    fn invalid_values_are_ignored() {
        let mut cfg = CaptureConfig::default();
        let changes = cfg.apply_snapshot(&snapshot(&[
            ("capture_type", "webcam"),
            ("capture_fps", "fast"),
            ("anti_cheat", "maybe"),
            ("capture_id", "desktop:x:1"),
        ]));
        assert_eq!(changes, 0);
        assert_eq!(cfg, CaptureConfig::default());
    }

    #[test]
    fn capture_id_applies_only_to_desktop() {
        let mut cfg = CaptureConfig::default();
        assert_eq!(cfg.apply_snapshot(&snapshot(&[("capture_id", "gdi:2:3")])), 0);
        assert_eq!(cfg.apply_snapshot(&snapshot(&[("capture_id", "desktop:2:3")])), 1);
        assert_eq!((cfg.adapter, cfg.desktop), (2, 3));
        assert_eq!(cfg.apply_snapshot(&snapshot(&[("capture_id", "desktop:1")])), 1);
        assert_eq!((cfg.adapter, cfg.desktop), (1, 3));
    }

    #[test]
    fn target_selection() {
        let mut cfg = CaptureConfig {
            window_class: "Game".into(),
            ..Default::default()
        };
        assert_eq!(cfg.target().match_mode, MatchMode::ClassAndTitle);

        cfg.exe_path = "/usr/bin/game".into();
        cfg.window_handle = Some(42);
        cfg.capture_once = true;
        let target = cfg.target();
        assert_eq!(target.match_mode, MatchMode::ClassTitleExeAndHandle);
        assert!(target.require_exact_handle);
        assert_eq!(target.handle, Some(WindowId(42)));

        let handle_only = CaptureConfig {
            window_handle: Some(7),
            ..Default::default()
        };
        assert_eq!(handle_only.target().match_mode, MatchMode::HandleOnly);
    }

    #[test]
    fn configured_title_does_not_hide_window() {
        use crate::region::Rect;
        use crate::window::{WindowInfo, WindowResolver};

        let cfg = CaptureConfig {
            window_class: "Notepad".into(),
            window_name: "Untitled - Notepad".into(),
            ..Default::default()
        };
        let windows = vec![WindowInfo::new(
            WindowId(3),
            "Notepad",
            "notes.txt - Notepad",
            Rect::new(0, 0, 640, 480),
        )];
        let found = WindowResolver::new().resolve(&cfg.target(), &windows);
        assert_eq!(found.map(|w| w.id), Some(WindowId(3)));
    }

    #[test]
    fn output_change_needs_restart() {
        let running = Config::default();
        let mut reloaded = running.clone();
        reloaded.capture.fps = 60;
        assert!(reloaded.restart_only_changes(&running).is_empty());

        reloaded.output.width = 1280;
        reloaded.output.height = 720;
        assert_eq!(
            reloaded.restart_only_changes(&running),
            vec!["output 1920x1080 -> 1280x720".to_string()]
        );
    }
}
