//! In-memory capture devices
//!
//! A [`SyntheticBackend`] serves [`SyntheticCamera`]s by index. A camera is
//! either free-running (one frame per fixed interval) or gated, in which
//! case each read blocks until its [`TickDriver`] releases a frame.

use super::synthetic_data::solid_frame;
use crate::errors::CameraError;
use crate::platform::{CaptureDevice, DeviceBackend};
use crate::types::{CameraDeviceInfo, CameraFrame, FourCc, FrameRequest, NegotiatedFormat};
use crossbeam_channel::{Receiver, Sender};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
enum Gate {
    Frame,
    Fail,
}

#[derive(Debug, Clone)]
enum Pacing {
    FreeRunning(Duration),
    Gated(Receiver<Gate>),
}

/// Releases frames to a gated [`SyntheticCamera`]
#[derive(Debug)]
pub struct TickDriver {
    sender: Option<Sender<Gate>>,
}

impl TickDriver {
    /// Let `n` reads succeed
    pub fn tick(&self, n: usize) {
        self.send(Gate::Frame, n);
    }

    /// Make the next `n` reads fail
    pub fn fail(&self, n: usize) {
        self.send(Gate::Fail, n);
    }

    /// Disconnect the gate; every later read fails immediately
    pub fn close(&mut self) {
        self.sender = None;
    }

    fn send(&self, gate: Gate, n: usize) {
        if let Some(sender) = &self.sender {
            for _ in 0..n {
                let _ = sender.send(gate);
            }
        }
    }
}

/// Description of a synthetic device
#[derive(Debug, Clone)]
pub struct SyntheticCamera {
    name: String,
    pacing: Pacing,
    native_resolution: Option<(u32, u32)>,
    native_pixel_format: Option<FourCc>,
    reject_configure: bool,
    lose_on_configure: bool,
}

impl SyntheticCamera {
    fn with_pacing(pacing: Pacing) -> Self {
        Self {
            name: "Synthetic Camera".to_string(),
            pacing,
            native_resolution: None,
            native_pixel_format: None,
            reject_configure: false,
            lose_on_configure: false,
        }
    }

    /// Delivers a frame every `interval`
    pub fn free_running(interval: Duration) -> Self {
        Self::with_pacing(Pacing::FreeRunning(interval))
    }

    /// Delivers a frame only when the returned driver ticks
    pub fn gated() -> (Self, TickDriver) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (
            Self::with_pacing(Pacing::Gated(receiver)),
            TickDriver {
                sender: Some(sender),
            },
        )
    }

    /// Ignore requested sizes and always deliver this one
    pub fn with_native_resolution(mut self, width: u32, height: u32) -> Self {
        self.native_resolution = Some((width, height));
        self
    }

    /// Ignore requested pixel formats and always deliver this one
    pub fn with_native_pixel_format(mut self, pixel_format: FourCc) -> Self {
        self.native_pixel_format = Some(pixel_format);
        self
    }

    /// Fail every format request
    pub fn rejecting_configure(mut self) -> Self {
        self.reject_configure = true;
        self
    }

    /// Drop the handle on the first format request, like a device that
    /// cannot be reopened
    pub fn losing_handle_on_configure(mut self) -> Self {
        self.lose_on_configure = true;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Per-index counters, kept across reopenings
#[derive(Debug, Default)]
pub struct DeviceStats {
    opens: AtomicU64,
    releases: AtomicU64,
    frames_read: AtomicU64,
}

impl DeviceStats {
    pub fn opens(&self) -> u64 {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> u64 {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read.load(Ordering::SeqCst)
    }
}

struct Slot {
    camera: SyntheticCamera,
    stats: Arc<DeviceStats>,
}

/// Backend serving synthetic cameras; indices without a camera fail to open
#[derive(Default)]
pub struct SyntheticBackend {
    cameras: Mutex<BTreeMap<u32, Slot>>,
}

impl SyntheticBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_camera(self, index: u32, camera: SyntheticCamera) -> Self {
        self.insert(index, camera);
        self
    }

    pub fn insert(&self, index: u32, camera: SyntheticCamera) {
        self.cameras
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                index,
                Slot {
                    camera,
                    stats: Arc::new(DeviceStats::default()),
                },
            );
    }

    /// Counters for the camera at `index`
    pub fn stats(&self, index: u32) -> Option<Arc<DeviceStats>> {
        self.cameras
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&index)
            .map(|slot| Arc::clone(&slot.stats))
    }
}

impl DeviceBackend for SyntheticBackend {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn open(&self, index: u32) -> Result<Box<dyn CaptureDevice>, CameraError> {
        let cameras = self.cameras.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = cameras.get(&index).ok_or_else(|| {
            CameraError::InitializationError(format!("no synthetic camera at index {}", index))
        })?;

        slot.stats.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SyntheticDevice {
            index,
            camera: slot.camera.clone(),
            stats: Arc::clone(&slot.stats),
            size: slot.camera.native_resolution.unwrap_or((640, 480)),
            frames: 0,
        }))
    }

    fn enumerate(&self, _alternate: bool) -> Result<Vec<CameraDeviceInfo>, CameraError> {
        let cameras = self.cameras.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(cameras
            .iter()
            .map(|(index, slot)| CameraDeviceInfo::new(index.to_string(), slot.camera.name.clone()))
            .collect())
    }
}

struct SyntheticDevice {
    index: u32,
    camera: SyntheticCamera,
    stats: Arc<DeviceStats>,
    size: (u32, u32),
    frames: u64,
}

impl CaptureDevice for SyntheticDevice {
    fn configure(&mut self, request: &FrameRequest) -> Result<NegotiatedFormat, CameraError> {
        if self.camera.lose_on_configure {
            return Err(CameraError::DeviceLost(format!(
                "synthetic camera {} could not be reopened",
                self.index
            )));
        }
        if self.camera.reject_configure {
            return Err(CameraError::InitializationError(
                "format request rejected".to_string(),
            ));
        }

        self.size = self
            .camera
            .native_resolution
            .unwrap_or((request.width, request.height));
        Ok(NegotiatedFormat {
            width: self.size.0,
            height: self.size.1,
            pixel_format: self
                .camera
                .native_pixel_format
                .unwrap_or_else(|| request.pixel_format()),
        })
    }

    fn read_frame(&mut self) -> Result<CameraFrame, CameraError> {
        match &self.camera.pacing {
            Pacing::FreeRunning(interval) => std::thread::sleep(*interval),
            Pacing::Gated(gate) => match gate.recv() {
                Ok(Gate::Frame) => {}
                Ok(Gate::Fail) => {
                    return Err(CameraError::CaptureError("synthetic read failure".to_string()))
                }
                Err(_) => return Err(CameraError::StreamError("tick driver closed".to_string())),
            },
        }

        self.frames += 1;
        self.stats.frames_read.fetch_add(1, Ordering::SeqCst);
        Ok(solid_frame(
            self.frames,
            self.size.0,
            self.size.1,
            self.index.to_string(),
        ))
    }

    fn release(&mut self) {
        self.stats.releases.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_index_fails_to_open() {
        let backend = SyntheticBackend::new();
        assert!(backend.open(3).is_err());
    }

    #[test]
    fn test_gated_reads_follow_driver() {
        let (camera, mut driver) = SyntheticCamera::gated();
        let backend = SyntheticBackend::new().with_camera(0, camera);
        let mut device = backend.open(0).unwrap();

        driver.tick(1);
        driver.fail(1);
        assert!(device.read_frame().is_ok());
        assert!(device.read_frame().is_err());

        driver.close();
        assert!(device.read_frame().is_err());

        let stats = backend.stats(0).unwrap();
        assert_eq!(stats.opens(), 1);
        assert_eq!(stats.frames_read(), 1);
    }

    #[test]
    fn test_native_overrides_request() {
        let camera = SyntheticCamera::free_running(Duration::ZERO)
            .with_native_resolution(640, 480)
            .with_native_pixel_format(FourCc::YUYV);
        let backend = SyntheticBackend::new().with_camera(1, camera);
        let mut device = backend.open(1).unwrap();

        let negotiated = device
            .configure(&FrameRequest {
                width: 1920,
                height: 1080,
                codec: FourCc::H264,
            })
            .unwrap();
        assert_eq!((negotiated.width, negotiated.height), (640, 480));
        assert_eq!(negotiated.pixel_format, FourCc::YUYV);
        assert_eq!(device.read_frame().unwrap().width, 640);
    }

    #[test]
    fn test_enumerate_lists_cameras() {
        let backend = SyntheticBackend::new()
            .with_camera(2, SyntheticCamera::free_running(Duration::ZERO).with_name("B"))
            .with_camera(0, SyntheticCamera::free_running(Duration::ZERO).with_name("A"));
        let names: Vec<String> = backend
            .enumerate(false)
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["A", "B"]);
    }
}
