//! Per-device recording sinks
//!
//! A capture worker opens one [`FrameSink`] per recording through a
//! [`SinkFactory`]. [`EncoderSinkFactory`] picks the writer from the
//! connection's codec tag:
//! - `H264`, `AVC1`, `X264`: openh264 + muxide MP4 (feature `recording`)
//! - `MJPG`: Motion-JPEG stream through the `image` JPEG encoder
//!
//! # Example
//! ```rust,ignore
//! use crabcapture::recording::{EncoderSinkFactory, SinkFactory, SinkSpec};
//!
//! let spec = SinkSpec::new("run1_0_vid.mp4", FourCc::H264, 30.0, 1920, 1080);
//! let mut sink = EncoderSinkFactory.open(&spec)?;
//! sink.write_frame(&frame)?;
//! let stats = sink.finish()?;
//! ```

mod config;
#[cfg(feature = "recording")]
mod encoder;
mod mjpeg;
#[cfg(feature = "recording")]
mod recorder;

pub use config::{RecordingConfig, RecordingStats};
#[cfg(feature = "recording")]
pub use encoder::{EncodedFrame, H264Encoder};
pub use mjpeg::{MjpegWriter, MJPEG_QUALITY};
#[cfg(feature = "recording")]
pub use recorder::Recorder;

use crate::errors::CameraError;
use crate::types::{CameraFrame, FourCc};
use std::path::{Path, PathBuf};

/// Everything a sink needs to know up front
#[derive(Debug, Clone, PartialEq)]
pub struct SinkSpec {
    pub path: PathBuf,
    pub codec: FourCc,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
}

impl SinkSpec {
    pub fn new(path: impl Into<PathBuf>, codec: FourCc, fps: f64, width: u32, height: u32) -> Self {
        Self {
            path: path.into(),
            codec,
            fps,
            width,
            height,
        }
    }
}

/// An open output file. Owned by one worker; written from its polling thread.
pub trait FrameSink: Send {
    fn write_frame(&mut self, frame: &CameraFrame) -> Result<(), CameraError>;

    fn frames_written(&self) -> u64;

    /// Flush and close the file
    fn finish(self: Box<Self>) -> Result<RecordingStats, CameraError>;
}

/// Opens sinks for a codec tag
pub trait SinkFactory: Send + Sync {
    /// File extension used for recordings with this codec
    fn extension(&self, codec: &FourCc) -> &'static str;

    fn open(&self, spec: &SinkSpec) -> Result<Box<dyn FrameSink>, CameraError>;
}

/// Output file for one device within a run: `<prefix>_<deviceIndex>_vid.<ext>`
pub fn output_path(prefix: &Path, device_index: u32, extension: &str) -> PathBuf {
    let mut name = prefix.as_os_str().to_os_string();
    name.push(format!("_{}_vid.{}", device_index, extension));
    PathBuf::from(name)
}

/// Sink factory backed by the real encoders
#[derive(Debug, Default, Clone, Copy)]
pub struct EncoderSinkFactory;

impl SinkFactory for EncoderSinkFactory {
    fn extension(&self, codec: &FourCc) -> &'static str {
        if *codec == FourCc::MJPG {
            "mjpeg"
        } else {
            "mp4"
        }
    }

    fn open(&self, spec: &SinkSpec) -> Result<Box<dyn FrameSink>, CameraError> {
        if spec.codec.is_h264() {
            return open_h264(spec);
        }
        if spec.codec == FourCc::MJPG {
            let writer = MjpegWriter::create(&spec.path, spec.width, spec.height, spec.fps)?;
            return Ok(Box::new(writer));
        }

        Err(CameraError::EncodingError(format!(
            "codec '{}' is not supported on this platform",
            spec.codec
        )))
    }
}

#[cfg(feature = "recording")]
fn open_h264(spec: &SinkSpec) -> Result<Box<dyn FrameSink>, CameraError> {
    let title = spec
        .path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let config = RecordingConfig::new(spec.width, spec.height, spec.fps).with_title(title);
    Ok(Box::new(Recorder::new(&spec.path, config)?))
}

#[cfg(not(feature = "recording"))]
fn open_h264(spec: &SinkSpec) -> Result<Box<dyn FrameSink>, CameraError> {
    Err(CameraError::EncodingError(format!(
        "codec '{}' needs the `recording` feature",
        spec.codec
    )))
}
