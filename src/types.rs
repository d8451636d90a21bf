//! Core value types shared by the capture engine and its collaborators

use crate::errors::ConfigError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One captured frame, always RGB24 once it leaves a device backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub size_bytes: usize,
}

impl CameraFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, device_id: String) -> Self {
        let size_bytes = data.len();
        Self {
            data,
            width,
            height,
            format: "RGB8".to_string(),
            device_id,
            timestamp: Utc::now(),
            size_bytes,
        }
    }

    /// True when the buffer holds exactly `width * height` RGB24 pixels
    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() == (self.width as usize) * (self.height as usize) * 3
    }
}

/// Camera entry produced by device enumeration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraDeviceInfo {
    pub id: String,
    pub name: String,
    pub description: String,
}

impl CameraDeviceInfo {
    pub fn new(id: String, name: String) -> Self {
        Self {
            id,
            name,
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: String) -> Self {
        self.description = description;
        self
    }
}

/// Four-character codec tag, upper-cased and right-padded with spaces
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FourCc([u8; 4]);

impl FourCc {
    pub const H264: FourCc = FourCc(*b"H264");
    pub const MJPG: FourCc = FourCc(*b"MJPG");
    pub const YUYV: FourCc = FourCc(*b"YUYV");

    pub fn parse(tag: &str) -> Result<Self, ConfigError> {
        if !tag.is_ascii() {
            return Err(ConfigError::InvalidCodec {
                tag: tag.to_string(),
                reason: "codec tags must be ASCII",
            });
        }
        if tag.len() > 4 {
            return Err(ConfigError::InvalidCodec {
                tag: tag.to_string(),
                reason: "codec tags have at most four characters",
            });
        }

        let mut bytes = [b' '; 4];
        for (slot, b) in bytes.iter_mut().zip(tag.bytes()) {
            *slot = b.to_ascii_uppercase();
        }
        Ok(Self(bytes))
    }

    pub fn bytes(&self) -> [u8; 4] {
        self.0
    }

    /// Padded four-character form
    pub fn as_str(&self) -> &str {
        // Constructed from ASCII only.
        std::str::from_utf8(&self.0).unwrap_or("    ")
    }

    /// Tag without trailing padding
    pub fn trimmed(&self) -> &str {
        self.as_str().trim_end()
    }

    /// Tags that select the H.264 encoder
    pub fn is_h264(&self) -> bool {
        matches!(&self.0, b"H264" | b"AVC1" | b"X264")
    }

    /// Tags a camera can deliver frames in
    pub fn is_pixel_format(&self) -> bool {
        matches!(
            &self.0,
            b"MJPG" | b"YUYV" | b"YUY2" | b"NV12" | b"GREY" | b"Y800" | b"RGB3"
        )
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.trimmed())
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc({:?})", self.as_str())
    }
}

impl TryFrom<String> for FourCc {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        FourCc::parse(&value)
    }
}

impl From<FourCc> for String {
    fn from(value: FourCc) -> Self {
        value.trimmed().to_string()
    }
}

/// Capture parameters requested from a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRequest {
    pub width: u32,
    pub height: u32,
    /// Codec of the output file; the device is asked for a matching pixel format
    pub codec: FourCc,
}

impl FrameRequest {
    /// Pixel format to ask the device for. Encoder-only tags ask for MJPEG.
    pub fn pixel_format(&self) -> FourCc {
        if self.codec.is_pixel_format() {
            self.codec
        } else {
            FourCc::MJPG
        }
    }
}

/// Capture parameters the device actually agreed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiatedFormat {
    pub width: u32,
    pub height: u32,
    /// What the device delivers frames in, before decoding to RGB
    pub pixel_format: FourCc,
}
