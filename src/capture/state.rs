//! Per-device state shared between a worker and its polling thread

use crate::overlay::TextOverlay;
use crate::types::FourCc;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Recording on/off plus a generation number that changes on every start.
///
/// Packed into one atomic as `(generation << 1) | recording`.
///
/// Contract: [`RecordingFlag::begin`] is called only after the sink for the
/// new recording is in place, and its `Release` store pairs with the
/// `Acquire` load in [`RecordingFlag::snapshot`]. A polling thread that sees
/// `recording == true` therefore also sees the sink. Only the control side
/// writes the flag; the polling loop only reads it.
#[derive(Debug, Default)]
pub struct RecordingFlag {
    state: AtomicU64,
}

/// One consistent read of a [`RecordingFlag`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingSnapshot {
    pub recording: bool,
    pub generation: u64,
}

impl RecordingFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_recording(&self) -> bool {
        self.snapshot().recording
    }

    pub fn snapshot(&self) -> RecordingSnapshot {
        let state = self.state.load(Ordering::Acquire);
        RecordingSnapshot {
            recording: state & 1 == 1,
            generation: state >> 1,
        }
    }

    /// Switch recording on under a fresh generation; returns that generation
    pub fn begin(&self) -> u64 {
        let generation = (self.state.load(Ordering::Relaxed) >> 1) + 1;
        self.state.store((generation << 1) | 1, Ordering::Release);
        generation
    }

    /// Switch recording off; returns whether it was on
    pub fn end(&self) -> bool {
        self.state.fetch_and(!1, Ordering::AcqRel) & 1 == 1
    }
}

/// What one poll tick produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// The frame survives decimation
    pub retained: bool,
    /// Event sample for this tick; `None` when not recording
    pub event: Option<u32>,
}

/// Decimation and frame index bookkeeping for one device
#[derive(Debug, Clone)]
pub struct FrameCounter {
    decimation: u32,
    ticks: u64,
    frame_index: u32,
}

impl FrameCounter {
    /// A decimation of 0 is treated as 1
    pub fn new(decimation: u32) -> Self {
        Self {
            decimation: decimation.max(1),
            ticks: 0,
            frame_index: 0,
        }
    }

    /// Start counting from zero, as at the start of a recording
    pub fn reset(&mut self) {
        self.ticks = 0;
        self.frame_index = 0;
    }

    pub fn tick(&mut self, recording: bool) -> Tick {
        self.ticks += 1;
        let retained = self.ticks % self.decimation as u64 == 0;

        let event = match (recording, retained) {
            (false, _) => None,
            (true, true) => {
                self.frame_index = self.frame_index.saturating_add(1);
                Some(self.frame_index)
            }
            (true, false) => Some(0),
        };

        Tick { retained, event }
    }

    pub fn frame_index(&self) -> u32 {
        self.frame_index
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn decimation(&self) -> u32 {
        self.decimation
    }
}

/// A negotiated value that differs from the requested one
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NegotiationMismatch {
    pub field: &'static str,
    pub requested: String,
    pub actual: String,
}

/// Connection outcome for one device
#[derive(Debug, Clone, Serialize)]
pub struct DeviceState {
    pub device_index: u32,
    pub width: u32,
    pub height: u32,
    /// Codec of the files this device records
    pub codec: FourCc,
    /// What the device delivers frames in
    pub pixel_format: FourCc,
    /// Rate measured while connecting, when the measurement succeeded
    pub measured_fps: Option<f64>,
    /// Frame rate written into recordings
    pub target_fps: f64,
    pub decimation: u32,
    #[serde(skip)]
    pub overlay: Option<TextOverlay>,
    pub mismatches: Vec<NegotiationMismatch>,
}

/// Lifecycle of a capture worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerPhase {
    /// Device not opened yet
    Idle,
    /// Device open and measured, loop not started
    Connected,
    Running,
    /// Device handed back; terminal until the next connect
    Released,
}
