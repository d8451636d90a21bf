use std::fmt;
use std::path::PathBuf;

/// Backend-level failure reported by a device, sink or preview collaborator.
#[derive(Debug)]
pub enum CameraError {
    InitializationError(String),
    CaptureError(String),
    StreamError(String),
    EncodingError(String),
    MuxingError(String),
    IoError(String),
    /// The device handle is gone; nothing more can be read from it
    DeviceLost(String),
}

impl fmt::Display for CameraError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CameraError::InitializationError(msg) => write!(f, "Camera initialization error: {}", msg),
            CameraError::CaptureError(msg) => write!(f, "Capture error: {}", msg),
            CameraError::StreamError(msg) => write!(f, "Stream error: {}", msg),
            CameraError::EncodingError(msg) => write!(f, "Encoding error: {}", msg),
            CameraError::MuxingError(msg) => write!(f, "Muxing error: {}", msg),
            CameraError::IoError(msg) => write!(f, "IO error: {}", msg),
            CameraError::DeviceLost(msg) => write!(f, "Device lost: {}", msg),
        }
    }
}

impl std::error::Error for CameraError {}

impl From<std::io::Error> for CameraError {
    fn from(e: std::io::Error) -> Self {
        CameraError::IoError(e.to_string())
    }
}

/// A device could not be opened at all. The worker is discarded; siblings are unaffected.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("camera {index} is unavailable: {reason}")]
    DeviceUnavailable { index: u32, reason: String },
}

impl ConnectError {
    pub fn index(&self) -> u32 {
        match self {
            ConnectError::DeviceUnavailable { index, .. } => *index,
        }
    }
}

/// Recording could not be started for one device. Polling and preview continue.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("could not open {path:?} for recording camera {index}: {reason}")]
    SinkUnavailable {
        index: u32,
        path: PathBuf,
        reason: String,
    },
    #[error("camera {index} is not connected")]
    NotConnected { index: u32 },
}

/// Configuration-level failure, surfaced before any device is touched.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to access config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("failed to load layered config: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid codec tag {tag:?}: {reason}")]
    InvalidCodec { tag: String, reason: &'static str },
    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}
