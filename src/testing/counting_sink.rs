//! Sink factory that counts instead of encoding

use crate::errors::CameraError;
use crate::recording::{FrameSink, RecordingStats, SinkFactory, SinkSpec};
use crate::types::{CameraFrame, FourCc};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Default)]
struct Ledger {
    opened: Vec<SinkSpec>,
    frames: HashMap<PathBuf, u64>,
    finished: Vec<PathBuf>,
}

/// Creates an empty file per recording and counts the frames written to it.
/// Codecs marked with [`CountingSinkFactory::failing_codec`] refuse to open.
#[derive(Debug, Default)]
pub struct CountingSinkFactory {
    ledger: Arc<Mutex<Ledger>>,
    failing: HashSet<FourCc>,
}

impl CountingSinkFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_codec(mut self, codec: FourCc) -> Self {
        self.failing.insert(codec);
        self
    }

    /// Every spec a sink was opened for, in order
    pub fn opened(&self) -> Vec<SinkSpec> {
        self.ledger().opened.clone()
    }

    pub fn frames_written(&self, path: &Path) -> u64 {
        self.ledger().frames.get(path).copied().unwrap_or(0)
    }

    /// Paths whose sinks have been closed, in order
    pub fn finished(&self) -> Vec<PathBuf> {
        self.ledger().finished.clone()
    }

    fn ledger(&self) -> std::sync::MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SinkFactory for CountingSinkFactory {
    fn extension(&self, _codec: &FourCc) -> &'static str {
        "mp4"
    }

    fn open(&self, spec: &SinkSpec) -> Result<Box<dyn FrameSink>, CameraError> {
        if self.failing.contains(&spec.codec) {
            return Err(CameraError::EncodingError(format!(
                "codec '{}' refused",
                spec.codec
            )));
        }

        File::create(&spec.path)?;
        let mut ledger = self.ledger();
        ledger.opened.push(spec.clone());
        ledger.frames.insert(spec.path.clone(), 0);

        Ok(Box::new(CountingSink {
            path: spec.path.clone(),
            fps: spec.fps,
            frames: 0,
            ledger: Arc::clone(&self.ledger),
        }))
    }
}

struct CountingSink {
    path: PathBuf,
    fps: f64,
    frames: u64,
    ledger: Arc<Mutex<Ledger>>,
}

impl FrameSink for CountingSink {
    fn write_frame(&mut self, _frame: &CameraFrame) -> Result<(), CameraError> {
        self.frames += 1;
        self.ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .frames
            .insert(self.path.clone(), self.frames);
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames
    }

    fn finish(self: Box<Self>) -> Result<RecordingStats, CameraError> {
        self.ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .finished
            .push(self.path.clone());

        Ok(RecordingStats {
            video_frames: self.frames,
            dropped_frames: 0,
            duration_secs: if self.fps > 0.0 {
                self.frames as f64 / self.fps
            } else {
                0.0
            },
            bytes_written: 0,
            output_path: self.path.to_string_lossy().to_string(),
        })
    }
}
