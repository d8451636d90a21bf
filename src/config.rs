//! Configuration management for crabcapture
//!
//! Holds the device connection table, the timestamp overlay position and the
//! output naming used by session drivers. Loading, saving and validation live
//! here so that configuration problems surface before any device is touched.

use crate::errors::ConfigError;
use crate::types::FourCc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Master switch; when false no device is connected
    pub enabled: bool,
    /// Enumerate devices with the platform's native backend instead of the automatic one
    pub alternate_backend: bool,
    /// Where the date/time text is drawn on every retained frame
    pub timestamp_position: OverlayPosition,
    pub output: OutputConfig,
    /// One entry per device
    pub connections: Vec<ConnectionDescriptor>,
}

/// Output file naming for session drivers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: String,
    pub base_name: String,
}

/// Connection parameters for one capture device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    pub device_index: u32,
    pub width: u32,
    pub height: u32,
    /// Keep every n-th polled frame; 1 keeps all of them
    #[serde(default = "default_decimation")]
    pub decimation: u32,
    /// Forward retained frames to the preview surface
    #[serde(default)]
    pub display: bool,
    #[serde(default = "default_codec")]
    pub codec: FourCc,
}

fn default_decimation() -> u32 {
    1
}

/// Output codec for a column that names none. H.264 sinks only exist with
/// the `recording` feature, so plain builds fall back to Motion-JPEG.
#[cfg(feature = "recording")]
pub const DEFAULT_CODEC: FourCc = FourCc::H264;
#[cfg(not(feature = "recording"))]
pub const DEFAULT_CODEC: FourCc = FourCc::MJPG;

fn default_codec() -> FourCc {
    DEFAULT_CODEC
}

impl ConnectionDescriptor {
    pub fn new(device_index: u32, width: u32, height: u32) -> Self {
        Self {
            device_index,
            width,
            height,
            decimation: 1,
            display: false,
            codec: DEFAULT_CODEC,
        }
    }

    pub fn with_decimation(mut self, decimation: u32) -> Self {
        self.decimation = decimation;
        self
    }

    pub fn with_display(mut self, display: bool) -> Self {
        self.display = display;
        self
    }

    pub fn with_codec(mut self, codec: FourCc) -> Self {
        self.codec = codec;
        self
    }

    fn problems(&self, column: usize, out: &mut Vec<String>) {
        if self.width < 1 {
            out.push(format!("connection {column}: width must be greater than zero"));
        }
        if self.height < 1 {
            out.push(format!("connection {column}: height must be greater than zero"));
        }
        if self.decimation < 1 {
            out.push(format!("connection {column}: decimation must be at least one"));
        }
    }
}

/// Corner used for the timestamp overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "OverlayPositionRepr")]
pub enum OverlayPosition {
    #[default]
    None,
    UpperRight,
    UpperLeft,
    LowerRight,
    LowerLeft,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OverlayPositionRepr {
    Index(i64),
    Name(String),
}

impl TryFrom<OverlayPositionRepr> for OverlayPosition {
    type Error = String;

    fn try_from(value: OverlayPositionRepr) -> Result<Self, Self::Error> {
        match value {
            OverlayPositionRepr::Index(i) => OverlayPosition::from_index(i)
                .ok_or_else(|| format!("timestamp position {i} is outside 0..=4")),
            OverlayPositionRepr::Name(name) => name.parse(),
        }
    }
}

impl OverlayPosition {
    /// Legacy numbering: 0 none, 1 upper right, 2 upper left, 3 lower right, 4 lower left
    pub fn from_index(index: i64) -> Option<Self> {
        match index {
            0 => Some(OverlayPosition::None),
            1 => Some(OverlayPosition::UpperRight),
            2 => Some(OverlayPosition::UpperLeft),
            3 => Some(OverlayPosition::LowerRight),
            4 => Some(OverlayPosition::LowerLeft),
            _ => None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        *self != OverlayPosition::None
    }
}

impl std::str::FromStr for OverlayPosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(i) = s.trim().parse::<i64>() {
            return OverlayPosition::from_index(i)
                .ok_or_else(|| format!("timestamp position {i} is outside 0..=4"));
        }
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "none" => Ok(OverlayPosition::None),
            "upper_right" => Ok(OverlayPosition::UpperRight),
            "upper_left" => Ok(OverlayPosition::UpperLeft),
            "lower_right" => Ok(OverlayPosition::LowerRight),
            "lower_left" => Ok(OverlayPosition::LowerLeft),
            other => Err(format!("unknown timestamp position: {other}")),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: "./recordings".to_string(),
            base_name: "session".to_string(),
        }
    }
}

impl OutputConfig {
    /// Recording prefix for a run, e.g. `./recordings/sessionR01`
    pub fn run_prefix(&self, run: u32) -> PathBuf {
        Path::new(&self.directory).join(format!("{}R{:02}", self.base_name, run))
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            alternate_backend: false,
            timestamp_position: OverlayPosition::None,
            output: OutputConfig::default(),
            connections: vec![ConnectionDescriptor::new(0, 1920, 1080).with_display(true)],
        }
    }
}

impl CaptureConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        let config: CaptureConfig = toml::from_str(&contents)?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load configuration from an optional TOML file with `CRABCAPTURE_*` environment overrides
    pub fn load_layered<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::load_layered_with_env(path, "CRABCAPTURE")
    }

    /// Same as [`CaptureConfig::load_layered`] with a custom environment prefix.
    /// Nested keys use `__`, e.g. `CRABCAPTURE_OUTPUT__DIRECTORY`.
    pub fn load_layered_with_env<P: AsRef<Path>>(
        path: P,
        env_prefix: &str,
    ) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix(env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let toml_string = toml::to_string_pretty(self)?;
        fs::write(path, toml_string)?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("crabcapture.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate every connection column and report all problems at once
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        for (column, connection) in self.connections.iter().enumerate() {
            connection.problems(column, &mut problems);
        }
        if self.output.base_name.trim().is_empty() {
            problems.push("output base name must not be empty".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }
}
