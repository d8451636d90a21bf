//! MP4 recorder combining the H.264 encoder and the muxer

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use muxide::api::{Metadata, MuxerBuilder, VideoCodec};

use super::config::{RecordingConfig, RecordingStats};
use super::encoder::H264Encoder;
use super::FrameSink;
use crate::errors::CameraError;
use crate::types::CameraFrame;

/// Encodes frames to H.264 and muxes them into an MP4 file.
///
/// Every frame handed to [`Recorder::write_frame`] is encoded. Presentation
/// times advance by exactly `1 / fps` per frame, so the file plays back at
/// the configured rate regardless of how irregularly frames arrived.
pub struct Recorder {
    encoder: H264Encoder,
    muxer: muxide::api::Muxer<BufWriter<File>>,
    config: RecordingConfig,
    output_path: String,
    frame_count: u64,
    dropped_frames: u64,
    frame_duration_secs: f64,
}

impl Recorder {
    pub fn new<P: AsRef<Path>>(
        output_path: P,
        config: RecordingConfig,
    ) -> Result<Self, CameraError> {
        if !(config.fps.is_finite() && config.fps > 0.0) {
            return Err(CameraError::EncodingError(format!(
                "Invalid recording frame rate {}",
                config.fps
            )));
        }

        // Encoder first so bad dimensions never leave an empty file behind
        let encoder = H264Encoder::new(config.width, config.height)?;

        let output_path_str = output_path.as_ref().to_string_lossy().to_string();
        let file = File::create(&output_path)
            .map_err(|e| CameraError::IoError(format!("Failed to create output file: {}", e)))?;
        let writer = BufWriter::new(file);

        let mut metadata = Metadata::new().with_current_time();
        if let Some(ref title) = config.title {
            metadata = metadata.with_title(title);
        }

        let muxer = MuxerBuilder::new(writer)
            .video(VideoCodec::H264, config.width, config.height, config.fps)
            .with_fast_start(config.fast_start)
            .with_metadata(metadata)
            .build()
            .map_err(|e| CameraError::MuxingError(format!("Failed to create muxer: {}", e)))?;

        let frame_duration_secs = 1.0 / config.fps;

        Ok(Self {
            encoder,
            muxer,
            config,
            output_path: output_path_str,
            frame_count: 0,
            dropped_frames: 0,
            frame_duration_secs,
        })
    }

    /// Encode and mux one frame
    pub fn write_frame(&mut self, frame: &CameraFrame) -> Result<(), CameraError> {
        if frame.width != self.config.width || frame.height != self.config.height {
            return Err(CameraError::EncodingError(format!(
                "Frame dimensions {}x{} don't match recording config {}x{}",
                frame.width, frame.height, self.config.width, self.config.height
            )));
        }

        let encoded = self.encoder.encode_rgb(&frame.data)?;

        // The encoder may skip a frame under rate control
        if encoded.data.is_empty() {
            self.dropped_frames += 1;
            return Ok(());
        }

        let pts = self.frame_count as f64 * self.frame_duration_secs;
        self.muxer
            .write_video(pts, &encoded.data, encoded.is_keyframe)
            .map_err(|e| CameraError::MuxingError(format!("Failed to write frame: {}", e)))?;

        self.frame_count += 1;
        Ok(())
    }

    /// Finalize the file and return statistics
    pub fn finish(self) -> Result<RecordingStats, CameraError> {
        let muxer_stats = self.muxer.finish_with_stats().map_err(|e| {
            CameraError::MuxingError(format!("Failed to finalize recording: {}", e))
        })?;

        Ok(RecordingStats {
            video_frames: muxer_stats.video_frames,
            dropped_frames: self.dropped_frames,
            duration_secs: muxer_stats.duration_secs,
            bytes_written: muxer_stats.bytes_written,
            output_path: self.output_path,
        })
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }
}

impl FrameSink for Recorder {
    fn write_frame(&mut self, frame: &CameraFrame) -> Result<(), CameraError> {
        Recorder::write_frame(self, frame)
    }

    fn frames_written(&self) -> u64 {
        self.frame_count
    }

    fn finish(self: Box<Self>) -> Result<RecordingStats, CameraError> {
        Recorder::finish(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::synthetic_video_frame;
    use tempfile::tempdir;

    #[test]
    fn test_record_every_frame_given() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("run1_0_vid.mp4");
        let config = RecordingConfig::new(320, 240, 15.0).with_title("Test Recording");

        let mut recorder = Recorder::new(&output, config).expect("Recorder creation failed");
        for i in 0..15 {
            recorder
                .write_frame(&synthetic_video_frame(i, 320, 240))
                .expect("Frame write should succeed");
        }
        assert_eq!(recorder.frame_count() + recorder.dropped_frames(), 15);

        let stats = recorder.finish().expect("Finish should succeed");
        assert_eq!(stats.video_frames + stats.dropped_frames, 15);
        assert!(stats.bytes_written > 0);
        assert!(std::fs::metadata(&output).unwrap().len() > 0);
    }

    #[test]
    fn test_mismatched_frame_rejected() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("mismatch.mp4");
        let mut recorder = Recorder::new(&output, RecordingConfig::new(320, 240, 30.0)).unwrap();

        let result = recorder.write_frame(&synthetic_video_frame(0, 640, 480));
        assert!(matches!(result, Err(CameraError::EncodingError(_))));
    }

    #[test]
    fn test_bad_frame_rate_rejected_without_file() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("zero_fps.mp4");
        assert!(Recorder::new(&output, RecordingConfig::new(320, 240, 0.0)).is_err());
        assert!(!output.exists());
    }
}
