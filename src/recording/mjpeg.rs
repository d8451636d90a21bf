//! Motion-JPEG elementary stream writer
//!
//! Each frame is appended as a complete baseline JPEG image. Most players
//! and ffmpeg read the result directly (`-f mjpeg`).

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

use super::config::RecordingStats;
use super::FrameSink;
use crate::errors::CameraError;
use crate::types::CameraFrame;

/// JPEG quality used for every frame
pub const MJPEG_QUALITY: u8 = 85;

pub struct MjpegWriter {
    writer: BufWriter<File>,
    width: u32,
    height: u32,
    fps: f64,
    output_path: String,
    frame_count: u64,
    bytes_written: u64,
}

impl MjpegWriter {
    pub fn create<P: AsRef<Path>>(
        output_path: P,
        width: u32,
        height: u32,
        fps: f64,
    ) -> Result<Self, CameraError> {
        let file = File::create(&output_path)
            .map_err(|e| CameraError::IoError(format!("Failed to create output file: {}", e)))?;

        Ok(Self {
            writer: BufWriter::new(file),
            width,
            height,
            fps,
            output_path: output_path.as_ref().to_string_lossy().to_string(),
            frame_count: 0,
            bytes_written: 0,
        })
    }

    pub fn write_frame(&mut self, frame: &CameraFrame) -> Result<(), CameraError> {
        if frame.width != self.width || frame.height != self.height {
            return Err(CameraError::EncodingError(format!(
                "Frame dimensions {}x{} don't match stream {}x{}",
                frame.width, frame.height, self.width, self.height
            )));
        }

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, MJPEG_QUALITY)
            .encode(&frame.data, frame.width, frame.height, ExtendedColorType::Rgb8)
            .map_err(|e| CameraError::EncodingError(format!("JPEG encoding failed: {}", e)))?;

        self.writer.write_all(&jpeg)?;
        self.bytes_written += jpeg.len() as u64;
        self.frame_count += 1;
        Ok(())
    }

    pub fn finish(mut self) -> Result<RecordingStats, CameraError> {
        self.writer.flush()?;

        Ok(RecordingStats {
            video_frames: self.frame_count,
            dropped_frames: 0,
            duration_secs: self.frame_count as f64 / self.fps,
            bytes_written: self.bytes_written,
            output_path: self.output_path,
        })
    }
}

impl FrameSink for MjpegWriter {
    fn write_frame(&mut self, frame: &CameraFrame) -> Result<(), CameraError> {
        MjpegWriter::write_frame(self, frame)
    }

    fn frames_written(&self) -> u64 {
        self.frame_count
    }

    fn finish(self: Box<Self>) -> Result<RecordingStats, CameraError> {
        MjpegWriter::finish(*self)
    }
}
