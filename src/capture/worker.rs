//! One capture device and its polling thread

use super::state::{
    DeviceState, FrameCounter, NegotiationMismatch, RecordingFlag, WorkerPhase,
};
use super::CaptureContext;
use crate::config::ConnectionDescriptor;
use crate::errors::{CameraError, ConnectError, RecordError};
use crate::events::{channel_name, FrameEvent};
use crate::overlay::TextOverlay;
use crate::platform::CaptureDevice;
use crate::preview::window_name;
use crate::recording::{output_path, FrameSink, RecordingStats, SinkSpec};
use crate::timing::{probe_frame_rate, target_fps, RATE_PROBE_FRAMES};
use crate::types::{CameraFrame, FrameRequest, NegotiatedFormat};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

/// Pause after a failed read before trying again
pub const READ_RETRY_DELAY: Duration = Duration::from_millis(10);

struct ActiveRecording {
    path: PathBuf,
    sink: Box<dyn FrameSink>,
}

/// The only state the control side and the polling thread share
#[derive(Default)]
struct Shared {
    recording: RecordingFlag,
    sink: Mutex<Option<ActiveRecording>>,
    stop: AtomicBool,
}

impl Shared {
    fn lock_sink(&self) -> MutexGuard<'_, Option<ActiveRecording>> {
        self.sink.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Point-in-time view of a worker for status reporting
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub device_index: u32,
    pub phase: WorkerPhase,
    pub recording: bool,
    pub output: Option<PathBuf>,
    pub frames_written: u64,
}

/// Owns one capture device from connect to shutdown.
///
/// Lifecycle calls come from a single control thread. Once [`run`] has been
/// called the device belongs to the polling thread; it comes back through
/// the join in [`shutdown`] and is released only then.
///
/// [`run`]: CaptureWorker::run
/// [`shutdown`]: CaptureWorker::shutdown
pub struct CaptureWorker {
    descriptor: ConnectionDescriptor,
    ctx: CaptureContext,
    shared: Arc<Shared>,
    device: Option<Box<dyn CaptureDevice>>,
    state: Option<DeviceState>,
    handle: Option<JoinHandle<Box<dyn CaptureDevice>>>,
    phase: WorkerPhase,
}

impl CaptureWorker {
    pub fn new(descriptor: ConnectionDescriptor, ctx: CaptureContext) -> Self {
        Self {
            descriptor,
            ctx,
            shared: Arc::new(Shared::default()),
            device: None,
            state: None,
            handle: None,
            phase: WorkerPhase::Idle,
        }
    }

    pub fn device_index(&self) -> u32 {
        self.descriptor.device_index
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    pub fn phase(&self) -> WorkerPhase {
        self.phase
    }

    /// Negotiated state, once connected
    pub fn state(&self) -> Option<&DeviceState> {
        self.state.as_ref()
    }

    /// Open the device, negotiate the format and measure its frame rate.
    ///
    /// Blocks until [`RATE_PROBE_FRAMES`] frames have been read. Only an
    /// unopenable device is an error; format mismatches and a failed
    /// measurement are logged and recorded in the returned state.
    pub fn connect(&mut self) -> Result<DeviceState, ConnectError> {
        if let (WorkerPhase::Connected | WorkerPhase::Running, Some(state)) =
            (self.phase, self.state.as_ref())
        {
            return Ok(state.clone());
        }

        let index = self.descriptor.device_index;
        let mut device =
            self.ctx
                .backend
                .open(index)
                .map_err(|e| ConnectError::DeviceUnavailable {
                    index,
                    reason: e.to_string(),
                })?;

        let request = FrameRequest {
            width: self.descriptor.width,
            height: self.descriptor.height,
            codec: self.descriptor.codec,
        };
        let negotiated = match negotiate(index, device.as_mut(), &request) {
            Ok(negotiated) => negotiated,
            Err(e) => {
                device.release();
                return Err(ConnectError::DeviceUnavailable {
                    index,
                    reason: e.to_string(),
                });
            }
        };
        let mismatches = mismatches(&request, &negotiated);
        for m in &mismatches {
            log::warn!(
                "Camera {}: requested {} {} but the device uses {}",
                index,
                m.field,
                m.requested,
                m.actual
            );
        }

        let measured_fps = match probe_frame_rate(RATE_PROBE_FRAMES, || device.read_frame()) {
            Ok(fps) => Some(fps),
            Err(e) => {
                log::warn!("Camera {}: could not measure frame rate: {}", index, e);
                None
            }
        };
        let target = target_fps(measured_fps, self.descriptor.decimation);
        log::info!(
            "Camera {}: {}x{} {} recording as {} at {:.2} fps after decimation by {}",
            index,
            negotiated.width,
            negotiated.height,
            negotiated.pixel_format,
            self.descriptor.codec,
            target,
            self.descriptor.decimation
        );

        let state = DeviceState {
            device_index: index,
            width: negotiated.width,
            height: negotiated.height,
            codec: self.descriptor.codec,
            pixel_format: negotiated.pixel_format,
            measured_fps,
            target_fps: target,
            decimation: self.descriptor.decimation.max(1),
            overlay: TextOverlay::new(self.ctx.overlay, negotiated.width, negotiated.height),
            mismatches,
        };

        self.shared = Arc::new(Shared::default());
        self.device = Some(device);
        self.state = Some(state.clone());
        self.phase = WorkerPhase::Connected;
        Ok(state)
    }

    /// Start the polling thread. Does nothing unless freshly connected.
    pub fn run(&mut self) {
        if self.phase != WorkerPhase::Connected {
            log::debug!(
                "Camera {}: run ignored in phase {:?}",
                self.device_index(),
                self.phase
            );
            return;
        }
        let (Some(device), Some(state)) = (self.device.take(), self.state.as_ref()) else {
            return;
        };

        let index = state.device_index;
        let poller = PollLoop {
            device_index: index,
            channel: channel_name(index),
            window: self.descriptor.display.then(|| window_name(index)),
            overlay: state.overlay,
            counter: FrameCounter::new(state.decimation),
            generation: 0,
            ctx: self.ctx.clone(),
            shared: Arc::clone(&self.shared),
            read_failing: false,
            write_failing: false,
        };

        let spawned = std::thread::Builder::new()
            .name(format!("crabcapture-device-{}", index))
            .spawn(move || poller.run(device));

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                self.phase = WorkerPhase::Running;
            }
            Err(e) => {
                log::error!("Camera {}: could not start capture thread: {}", index, e);
                self.phase = WorkerPhase::Released;
            }
        }
    }

    /// Open a new output file under `prefix` and switch recording on.
    ///
    /// Starts the polling loop if it is not running yet. A recording already
    /// in progress is closed first. On failure recording stays off and the
    /// loop keeps polling.
    pub fn start_recording(&mut self, prefix: &Path) -> Result<PathBuf, RecordError> {
        let index = self.device_index();
        let Some(state) = self.state.clone() else {
            return Err(RecordError::NotConnected { index });
        };
        if self.phase == WorkerPhase::Connected {
            self.run();
        }
        if self.phase != WorkerPhase::Running {
            return Err(RecordError::NotConnected { index });
        }
        if self.shared.recording.is_recording() {
            self.stop_recording();
        }

        let extension = self.ctx.sinks.extension(&state.codec);
        let path = output_path(prefix, index, extension);
        let spec = SinkSpec::new(
            path.clone(),
            state.codec,
            state.target_fps,
            state.width,
            state.height,
        );

        let sink = self.ctx.sinks.open(&spec).map_err(|e| {
            log::warn!(
                "Camera {}: could not open {} with codec {}: {}. Try a different codec for this camera.",
                index,
                path.display(),
                state.codec,
                e
            );
            RecordError::SinkUnavailable {
                index,
                path: path.clone(),
                reason: e.to_string(),
            }
        })?;

        {
            let mut slot = self.shared.lock_sink();
            *slot = Some(ActiveRecording {
                path: path.clone(),
                sink,
            });
            self.shared.recording.begin();
        }

        log::info!("Camera {}: recording to {}", index, path.display());
        Ok(path)
    }

    /// Switch recording off and close the sink. Safe to call at any time.
    pub fn stop_recording(&mut self) -> Option<RecordingStats> {
        self.shared.recording.end();
        let active = self.shared.lock_sink().take()?;

        let index = self.device_index();
        match active.sink.finish() {
            Ok(stats) => {
                log::info!(
                    "Camera {}: recording stopped, {} frames in {}",
                    index,
                    stats.video_frames,
                    active.path.display()
                );
                Some(stats)
            }
            Err(e) => {
                log::error!(
                    "Camera {}: failed to finalize {}: {}",
                    index,
                    active.path.display(),
                    e
                );
                None
            }
        }
    }

    pub fn is_recording(&self) -> bool {
        self.shared.recording.is_recording()
    }

    pub fn is_running(&self) -> bool {
        self.phase == WorkerPhase::Running
    }

    pub fn status(&self) -> WorkerStatus {
        let slot = self.shared.lock_sink();
        WorkerStatus {
            device_index: self.device_index(),
            phase: self.phase,
            recording: self.shared.recording.is_recording(),
            output: slot.as_ref().map(|a| a.path.clone()),
            frames_written: slot.as_ref().map_or(0, |a| a.sink.frames_written()),
        }
    }

    /// Stop the loop, wait for it, then release the device and close the preview.
    ///
    /// Idempotent, and safe on a worker that never connected.
    pub fn shutdown(&mut self) {
        self.stop_recording();
        self.shared.stop.store(true, Ordering::Release);

        let index = self.device_index();
        let device = match self.handle.take() {
            Some(handle) => match handle.join() {
                Ok(device) => Some(device),
                Err(_) => {
                    log::error!("Camera {}: capture thread panicked", index);
                    None
                }
            },
            None => self.device.take(),
        };

        if let Some(mut device) = device {
            device.release();
            log::debug!("Camera {}: device released", index);
        }

        if self.phase != WorkerPhase::Idle && self.phase != WorkerPhase::Released {
            if self.descriptor.display {
                self.ctx.preview.close(&window_name(index));
            }
            self.phase = WorkerPhase::Released;
        }
    }
}

impl Drop for CaptureWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Apply the request and read back what the device settled on.
///
/// A rejected request falls back to the device defaults. Fails when the
/// handle is lost, or when the device cannot deliver a single frame.
fn negotiate(
    index: u32,
    device: &mut dyn CaptureDevice,
    request: &FrameRequest,
) -> Result<NegotiatedFormat, CameraError> {
    match device.configure(request) {
        Ok(negotiated) => Ok(negotiated),
        Err(e @ CameraError::DeviceLost(_)) => Err(e),
        Err(e) => {
            log::warn!(
                "Camera {}: could not apply requested format, using device defaults: {}",
                index,
                e
            );
            // The frame size is still observable; the pixel format is not.
            let frame = device.read_frame()?;
            Ok(NegotiatedFormat {
                width: frame.width,
                height: frame.height,
                pixel_format: request.pixel_format(),
            })
        }
    }
}

fn mismatches(request: &FrameRequest, actual: &NegotiatedFormat) -> Vec<NegotiationMismatch> {
    let mut found = Vec::new();
    if request.width != actual.width {
        found.push(NegotiationMismatch {
            field: "width",
            requested: request.width.to_string(),
            actual: actual.width.to_string(),
        });
    }
    if request.height != actual.height {
        found.push(NegotiationMismatch {
            field: "height",
            requested: request.height.to_string(),
            actual: actual.height.to_string(),
        });
    }
    // Encoder-only tags never name a device format, so there is nothing to compare
    if request.codec.is_pixel_format() && request.codec != actual.pixel_format {
        found.push(NegotiationMismatch {
            field: "pixel_format",
            requested: request.codec.to_string(),
            actual: actual.pixel_format.to_string(),
        });
    }
    found
}

/// Everything the polling thread owns
struct PollLoop {
    device_index: u32,
    channel: String,
    window: Option<String>,
    overlay: Option<TextOverlay>,
    counter: FrameCounter,
    generation: u64,
    ctx: CaptureContext,
    shared: Arc<Shared>,
    read_failing: bool,
    write_failing: bool,
}

impl PollLoop {
    fn run(mut self, mut device: Box<dyn CaptureDevice>) -> Box<dyn CaptureDevice> {
        log::info!("Camera {}: capture thread started", self.device_index);

        while !self.shared.stop.load(Ordering::Acquire) {
            let frame = match device.read_frame() {
                Ok(frame) => {
                    if self.read_failing {
                        log::info!("Camera {}: frames arriving again", self.device_index);
                        self.read_failing = false;
                    }
                    frame
                }
                Err(e) => {
                    if !self.read_failing {
                        log::warn!("Camera {}: frame read failed: {}", self.device_index, e);
                        self.read_failing = true;
                    }
                    std::thread::sleep(READ_RETRY_DELAY);
                    continue;
                }
            };
            let timestamp_us = self.ctx.clock.pts_us();
            self.process(frame, timestamp_us);
        }

        log::info!("Camera {}: capture thread exiting", self.device_index);
        device
    }

    fn process(&mut self, mut frame: CameraFrame, timestamp_us: u64) {
        if !self.shared.recording.is_recording() {
            if self.counter.tick(false).retained {
                self.present(&mut frame);
            }
            return;
        }

        // The sink slot and the flag only change together while this lock is
        // held, so a decision made under it is consistent with both.
        let shared = Arc::clone(&self.shared);
        let mut slot = shared.lock_sink();
        let snapshot = shared.recording.snapshot();
        if !snapshot.recording || slot.is_none() {
            drop(slot);
            if self.counter.tick(false).retained {
                self.present(&mut frame);
            }
            return;
        }
        let Some(active) = slot.as_mut() else {
            return;
        };

        if snapshot.generation != self.generation {
            self.generation = snapshot.generation;
            self.counter.reset();
            self.write_failing = false;
        }

        let tick = self.counter.tick(true);
        if tick.retained {
            self.present(&mut frame);
            match active.sink.write_frame(&frame) {
                Ok(()) => self.write_failing = false,
                Err(e) if !self.write_failing => {
                    log::warn!(
                        "Camera {}: could not write frame to {}: {}",
                        self.device_index,
                        active.path.display(),
                        e
                    );
                    self.write_failing = true;
                }
                Err(_) => {}
            }
        }

        if let Some(value) = tick.event {
            self.ctx.events.emit(FrameEvent {
                channel: self.channel.clone(),
                device_index: self.device_index,
                value,
                timestamp_us,
            });
        }
    }

    fn present(&self, frame: &mut CameraFrame) {
        if let Some(overlay) = &self.overlay {
            overlay.stamp(frame);
        }
        if let Some(window) = &self.window {
            self.ctx.preview.show(window, frame);
        }
    }
}
