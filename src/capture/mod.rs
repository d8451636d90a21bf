//! Multi-device capture engine
//!
//! A [`CaptureSupervisor`] owns one [`CaptureWorker`] per configured device.
//! Each worker polls its device on a dedicated thread, decimates, stamps the
//! timestamp overlay, feeds the preview and, while recording, writes to its
//! sink and emits one frame index event per poll tick.

mod state;
mod supervisor;
mod worker;

pub use state::{
    DeviceState, FrameCounter, NegotiationMismatch, RecordingFlag, RecordingSnapshot, Tick,
    WorkerPhase,
};
pub use supervisor::{CaptureSupervisor, SupervisorState};
pub use worker::{CaptureWorker, WorkerStatus, READ_RETRY_DELAY};

use crate::config::OverlayPosition;
use crate::events::{EventSink, LogEventSink};
use crate::platform::{DeviceBackend, NokhwaBackend};
use crate::preview::{NullPreview, PreviewSurface};
use crate::recording::{EncoderSinkFactory, SinkFactory};
use crate::timing::PTSClock;
use std::sync::Arc;

/// Collaborators shared by every worker of a session
#[derive(Clone)]
pub struct CaptureContext {
    pub backend: Arc<dyn DeviceBackend>,
    pub sinks: Arc<dyn SinkFactory>,
    pub events: Arc<dyn EventSink>,
    pub preview: Arc<dyn PreviewSurface>,
    /// Corner for the timestamp text on retained frames
    pub overlay: OverlayPosition,
    /// Event timebase shared by all devices
    pub clock: PTSClock,
}

impl CaptureContext {
    pub fn new(backend: Arc<dyn DeviceBackend>, sinks: Arc<dyn SinkFactory>) -> Self {
        Self {
            backend,
            sinks,
            events: Arc::new(LogEventSink),
            preview: Arc::new(NullPreview),
            overlay: OverlayPosition::None,
            clock: PTSClock::new(),
        }
    }

    /// Native cameras and the real encoders
    pub fn native() -> Self {
        Self::new(Arc::new(NokhwaBackend::new()), Arc::new(EncoderSinkFactory))
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_preview(mut self, preview: Arc<dyn PreviewSurface>) -> Self {
        self.preview = preview;
        self
    }

    pub fn with_overlay(mut self, overlay: OverlayPosition) -> Self {
        self.overlay = overlay;
        self
    }

    pub fn with_clock(mut self, clock: PTSClock) -> Self {
        self.clock = clock;
        self
    }
}
