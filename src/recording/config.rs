//! Recording configuration types

use serde::{Deserialize, Serialize};

/// Configuration for one MP4 recording
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Video width in pixels
    pub width: u32,
    /// Video height in pixels
    pub height: u32,
    /// Frames per second written into the container timing
    pub fps: f64,
    /// Put the moov atom before mdat
    pub fast_start: bool,
    /// Optional title metadata
    pub title: Option<String>,
}

impl RecordingConfig {
    pub fn new(width: u32, height: u32, fps: f64) -> Self {
        Self {
            width,
            height,
            fps,
            fast_start: true,
            title: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_fast_start(mut self, enabled: bool) -> Self {
        self.fast_start = enabled;
        self
    }
}

/// Statistics returned when a sink is closed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordingStats {
    /// Frames that made it into the file
    pub video_frames: u64,
    /// Frames the encoder produced no output for
    pub dropped_frames: u64,
    /// Media duration in seconds
    pub duration_secs: f64,
    pub bytes_written: u64,
    pub output_path: String,
}

impl RecordingStats {
    /// Average bitrate achieved, in bits per second
    pub fn avg_bitrate(&self) -> f64 {
        if self.duration_secs > 0.0 {
            (self.bytes_written as f64 * 8.0) / self.duration_secs
        } else {
            0.0
        }
    }
}
