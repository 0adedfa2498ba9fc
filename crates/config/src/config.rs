//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// A value parsed but is out of range
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Expand a leading `~` using `HOME`. Other paths are returned unchanged.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
    }
}

/// Watch folder location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FolderConfig {
    /// Base directory holding `inbox/`, `processing/` and `done/`
    #[serde(default = "default_watch_base")]
    pub watch_base: PathBuf,
}

fn default_watch_base() -> PathBuf {
    PathBuf::from("~/Movies/Clipper")
}

impl Default for FolderConfig {
    fn default() -> Self {
        Self {
            watch_base: default_watch_base(),
        }
    }
}

impl FolderConfig {
    /// Watch base with `~` expanded.
    pub fn resolved_watch_base(&self) -> PathBuf {
        expand_home(&self.watch_base)
    }
}

/// Preset selection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PresetConfig {
    /// Preset used when a filename carries no preset suffix
    #[serde(default = "default_preset_name")]
    pub default: String,
}

fn default_preset_name() -> String {
    "social".to_string()
}

impl Default for PresetConfig {
    fn default() -> Self {
        Self {
            default: default_preset_name(),
        }
    }
}

/// Inbox watcher behaviour
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatcherConfig {
    /// Grace period before a new path counts as arrived
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Pick up files already sitting in the inbox at start-up
    #[serde(default = "default_true")]
    pub scan_existing: bool,
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_true() -> bool {
    true
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            scan_existing: true,
        }
    }
}

/// External media tools
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolsConfig {
    #[serde(default = "default_ffmpeg_bin")]
    pub ffmpeg_bin: PathBuf,
    #[serde(default = "default_ffprobe_bin")]
    pub ffprobe_bin: PathBuf,
    /// Hard limit for one probe call
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// Minimum spacing between progress callbacks
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
}

fn default_ffmpeg_bin() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe_bin() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_probe_timeout_secs() -> u64 {
    30
}

fn default_progress_interval_ms() -> u64 {
    100
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_bin: default_ffmpeg_bin(),
            ffprobe_bin: default_ffprobe_bin(),
            probe_timeout_secs: default_probe_timeout_secs(),
            progress_interval_ms: default_progress_interval_ms(),
        }
    }
}

/// GIF conversion settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GifConfig {
    #[serde(default = "default_gif_fps")]
    pub fps: u32,
    /// Output width in pixels, height follows the aspect ratio
    #[serde(default = "default_gif_width")]
    pub width: u32,
}

fn default_gif_fps() -> u32 {
    15
}

fn default_gif_width() -> u32 {
    480
}

impl Default for GifConfig {
    fn default() -> Self {
        Self {
            fps: default_gif_fps(),
            width: default_gif_width(),
        }
    }
}

/// Silent loop conversion settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoopConfig {
    #[serde(default = "default_loop_scale")]
    pub scale: f64,
    #[serde(default = "default_loop_crf")]
    pub crf: u32,
}

fn default_loop_scale() -> f64 {
    0.5
}

fn default_loop_crf() -> u32 {
    23
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            scale: default_loop_scale(),
            crf: default_loop_crf(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BehaviorConfig {
    /// Remove the processed source from `processing/` after a successful job
    #[serde(default = "default_true")]
    pub delete_source: bool,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            delete_source: true,
        }
    }
}

/// Completed-job history file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Defaults to `<watch_base>/history.json`
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_history_max_entries")]
    pub max_entries: usize,
}

fn default_history_max_entries() -> usize {
    50
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
            max_entries: default_history_max_entries(),
        }
    }
}

impl HistoryConfig {
    /// History file location, falling back to a file under the watch base.
    pub fn resolved_path(&self, folders: &FolderConfig) -> PathBuf {
        match &self.path {
            Some(path) => expand_home(path),
            None => folders.resolved_watch_base().join("history.json"),
        }
    }
}

/// Optional HTTP status endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_status_bind")]
    pub bind: String,
}

fn default_status_bind() -> String {
    "127.0.0.1:7879".to_string()
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: default_status_bind(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub folders: FolderConfig,
    #[serde(default)]
    pub presets: PresetConfig,
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub gif: GifConfig,
    #[serde(default, rename = "loop")]
    pub loop_: LoopConfig,
    #[serde(default)]
    pub behavior: BehaviorConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub status: StatusConfig,
}

/// Parse "true"/"1"/"yes" and "false"/"0"/"no"
fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing sections and fields take their defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// - CLIPPER_WATCH_BASE -> folders.watch_base
    /// - CLIPPER_DEFAULT_PRESET -> presets.default
    /// - CLIPPER_FFMPEG_BIN -> tools.ffmpeg_bin
    /// - CLIPPER_FFPROBE_BIN -> tools.ffprobe_bin
    /// - CLIPPER_DELETE_SOURCE -> behavior.delete_source
    /// - CLIPPER_STATUS_ENABLED -> status.enabled
    ///
    /// Empty or unparsable values leave the existing setting alone.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("CLIPPER_WATCH_BASE") {
            if !val.is_empty() {
                self.folders.watch_base = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("CLIPPER_DEFAULT_PRESET") {
            if !val.is_empty() {
                self.presets.default = val.to_lowercase();
            }
        }

        if let Ok(val) = env::var("CLIPPER_FFMPEG_BIN") {
            if !val.is_empty() {
                self.tools.ffmpeg_bin = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("CLIPPER_FFPROBE_BIN") {
            if !val.is_empty() {
                self.tools.ffprobe_bin = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("CLIPPER_DELETE_SOURCE") {
            if let Some(flag) = parse_bool(&val) {
                self.behavior.delete_source = flag;
            }
        }

        if let Ok(val) = env::var("CLIPPER_STATUS_ENABLED") {
            if let Some(flag) = parse_bool(&val) {
                self.status.enabled = flag;
            }
        }
    }

    /// Reject values that parse but cannot drive the pipeline.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.presets.default.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "presets.default must name a preset".to_string(),
            ));
        }
        if self.gif.fps == 0 || self.gif.width == 0 {
            return Err(ConfigError::Invalid(format!(
                "gif.fps and gif.width must be positive (got {} and {})",
                self.gif.fps, self.gif.width
            )));
        }
        if !(self.loop_.scale > 0.0 && self.loop_.scale <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "loop.scale must be in (0, 1], got {}",
                self.loop_.scale
            )));
        }
        Ok(())
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            Self::load_from_file(path)?
        } else {
            Config::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}
