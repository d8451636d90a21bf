//! Device capability seam
//!
//! The capture engine never talks to a camera driver directly. It opens
//! devices through a [`DeviceBackend`] and drives them through the
//! [`CaptureDevice`] handle it gets back. [`NokhwaBackend`] is the real
//! implementation; `crate::testing` provides a synthetic one.

pub mod native;

pub use native::{NokhwaBackend, NokhwaDevice};

use crate::errors::CameraError;
use crate::types::{CameraDeviceInfo, CameraFrame, FrameRequest, NegotiatedFormat};
use std::sync::Arc;
use std::thread::JoinHandle;

/// An open capture device, exclusively owned by one worker
pub trait CaptureDevice: Send {
    /// Request capture parameters and report what the device actually delivers.
    /// A device may refuse or substitute any requested value. Returns
    /// [`CameraError::DeviceLost`] when the handle did not survive the attempt.
    fn configure(&mut self, request: &FrameRequest) -> Result<NegotiatedFormat, CameraError>;

    /// Block until the next frame arrives
    fn read_frame(&mut self) -> Result<CameraFrame, CameraError>;

    /// Give the device back to the system. Called exactly once, after the
    /// polling loop has stopped.
    fn release(&mut self);
}

/// Opens capture devices by index
pub trait DeviceBackend: Send + Sync {
    fn name(&self) -> &str;

    fn open(&self, index: u32) -> Result<Box<dyn CaptureDevice>, CameraError>;

    /// Best-effort listing for operator diagnostics
    fn enumerate(&self, alternate: bool) -> Result<Vec<CameraDeviceInfo>, CameraError>;
}

/// Log the cameras a backend can see. Never fails.
pub fn log_available_cameras(backend: &dyn DeviceBackend, alternate: bool) {
    match backend.enumerate(alternate) {
        Ok(devices) if devices.is_empty() => {
            log::info!("Enumeration of cameras connected to system: no cameras were detected");
        }
        Ok(devices) => {
            let listing: Vec<String> = devices
                .iter()
                .map(|d| format!("  Camera detected at index {} ({})", d.id, d.name))
                .collect();
            log::info!(
                "Enumeration of cameras connected to system:\n{}",
                listing.join("\n")
            );
        }
        Err(e) => {
            log::info!("Camera enumeration unavailable on {}: {}", backend.name(), e);
        }
    }
}

/// Run [`log_available_cameras`] on a detached thread so it cannot hold up configuration
pub fn spawn_enumeration_diagnostic(
    backend: Arc<dyn DeviceBackend>,
    alternate: bool,
) -> Option<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("crabcapture-enumerate".to_string())
        .spawn(move || log_available_cameras(backend.as_ref(), alternate))
        .map_err(|e| log::debug!("Could not spawn enumeration thread: {}", e))
        .ok()
}
