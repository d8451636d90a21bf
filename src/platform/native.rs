//! Native camera access through nokhwa

use super::{CaptureDevice, DeviceBackend};
use crate::errors::CameraError;
use crate::types::{CameraDeviceInfo, CameraFrame, FourCc, FrameRequest, NegotiatedFormat};
use nokhwa::{
    pixel_format::RgbFormat,
    query,
    utils::{
        ApiBackend, CameraFormat as NokhwaFormat, CameraIndex, FrameFormat, RequestedFormat,
        RequestedFormatType, Resolution,
    },
    Buffer, CallbackCamera,
};

/// Frame rate hint sent with a format request; the real rate is measured afterwards
const REQUESTED_FPS: u32 = 30;

/// Device backend for the platform's camera stack
#[derive(Debug, Default, Clone, Copy)]
pub struct NokhwaBackend;

impl NokhwaBackend {
    pub fn new() -> Self {
        Self
    }

    fn api(alternate: bool) -> ApiBackend {
        if !alternate {
            ApiBackend::Auto
        } else if cfg!(target_os = "windows") {
            ApiBackend::MediaFoundation
        } else if cfg!(target_os = "macos") {
            ApiBackend::AVFoundation
        } else if cfg!(target_os = "linux") {
            ApiBackend::Video4Linux
        } else {
            ApiBackend::Auto
        }
    }
}

impl DeviceBackend for NokhwaBackend {
    fn name(&self) -> &str {
        "nokhwa"
    }

    fn open(&self, index: u32) -> Result<Box<dyn CaptureDevice>, CameraError> {
        let requested_format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::None);
        let camera = open_camera(index, requested_format)?;

        Ok(Box::new(NokhwaDevice {
            index,
            camera: Some(camera),
        }))
    }

    fn enumerate(&self, alternate: bool) -> Result<Vec<CameraDeviceInfo>, CameraError> {
        let api = Self::api(alternate);
        let cameras = query(api).map_err(|e| {
            CameraError::InitializationError(format!("Failed to query cameras: {}", e))
        })?;

        Ok(cameras
            .into_iter()
            .map(|info| {
                CameraDeviceInfo::new(info.index().to_string(), info.human_name())
                    .with_description(info.description().to_string())
            })
            .collect())
    }
}

fn open_camera(index: u32, format: RequestedFormat) -> Result<CallbackCamera, CameraError> {
    CallbackCamera::new(CameraIndex::Index(index), format, |_| {}).map_err(|e| {
        CameraError::InitializationError(format!("Failed to open camera {}: {}", index, e))
    })
}

/// One nokhwa camera. Frames leave as RGB24.
pub struct NokhwaDevice {
    index: u32,
    camera: Option<CallbackCamera>,
}

impl NokhwaDevice {
    fn camera(&mut self) -> Result<&mut CallbackCamera, CameraError> {
        self.camera
            .as_mut()
            .ok_or_else(|| CameraError::StreamError(format!("camera {} was released", self.index)))
    }

    fn next_buffer(&mut self) -> Result<Buffer, CameraError> {
        self.camera()?
            .poll_frame()
            .map_err(|e| CameraError::CaptureError(format!("Failed to capture frame: {}", e)))
    }
}

impl CaptureDevice for NokhwaDevice {
    fn configure(&mut self, request: &FrameRequest) -> Result<NegotiatedFormat, CameraError> {
        let wanted = NokhwaFormat::new(
            Resolution::new(request.width, request.height),
            frame_format_for(&request.pixel_format()),
            REQUESTED_FPS,
        );
        let closest = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(wanted));

        // The format request is fixed when a nokhwa camera is built, so reopen with it.
        // A device that rejects the request keeps whatever it opened with.
        self.camera = None;
        let camera = match open_camera(self.index, closest) {
            Ok(camera) => camera,
            Err(e) => {
                log::debug!("Camera {} rejected format request: {}", self.index, e);
                open_camera(
                    self.index,
                    RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
                )
                .map_err(|e| CameraError::DeviceLost(e.to_string()))?
            }
        };
        self.camera = Some(camera);

        let started = self.camera()?.open_stream();
        if let Err(e) = started {
            self.camera = None;
            return Err(CameraError::DeviceLost(format!(
                "Failed to start stream on camera {}: {}",
                self.index, e
            )));
        }

        // What the device delivers is the only reliable answer.
        let first = self.next_buffer()?;
        let resolution = first.resolution();
        Ok(NegotiatedFormat {
            width: resolution.width_x,
            height: resolution.height_y,
            pixel_format: fourcc_for(first.source_frame_format()),
        })
    }

    fn read_frame(&mut self) -> Result<CameraFrame, CameraError> {
        let buffer = self.next_buffer()?;
        let resolution = buffer.resolution();
        let (width, height) = (resolution.width_x, resolution.height_y);

        let rgb = decode_to_rgb(&buffer, width, height)?;
        Ok(CameraFrame::new(rgb, width, height, self.index.to_string()))
    }

    fn release(&mut self) {
        if let Some(mut camera) = self.camera.take() {
            log::debug!("Stopping camera stream for device {}", self.index);
            if let Err(e) = camera.stop_stream() {
                log::debug!("Camera {} stream did not stop cleanly: {}", self.index, e);
            }
        }
    }
}

impl Drop for NokhwaDevice {
    fn drop(&mut self) {
        self.release();
    }
}

fn decode_to_rgb(buffer: &Buffer, width: u32, height: u32) -> Result<Vec<u8>, CameraError> {
    let raw_bytes = buffer.buffer_bytes();
    let pixels = width as usize * height as usize;

    // Some backends label MJPEG payloads as something else; trust the SOI marker.
    if raw_bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        let img = image::load_from_memory(&raw_bytes)
            .map_err(|e| CameraError::CaptureError(format!("Failed to decode MJPEG: {}", e)))?;
        return Ok(img.to_rgb8().into_raw());
    }

    match buffer.source_frame_format() {
        FrameFormat::YUYV if raw_bytes.len() == pixels * 2 => {
            Ok(yuyv_to_rgb(&raw_bytes, width, height))
        }
        FrameFormat::RAWRGB if raw_bytes.len() == pixels * 3 => Ok(raw_bytes.to_vec()),
        FrameFormat::GRAY if raw_bytes.len() == pixels => {
            Ok(raw_bytes.iter().flat_map(|&l| [l, l, l]).collect())
        }
        _ => buffer
            .decode_image::<RgbFormat>()
            .map(|img| img.into_raw())
            .map_err(|e| CameraError::CaptureError(format!("Failed to decode frame: {}", e))),
    }
}

fn frame_format_for(pixel_format: &FourCc) -> FrameFormat {
    match pixel_format.as_str() {
        "YUYV" | "YUY2" => FrameFormat::YUYV,
        "NV12" => FrameFormat::NV12,
        "GREY" | "Y800" => FrameFormat::GRAY,
        "RGB3" | "RGB " => FrameFormat::RAWRGB,
        _ => FrameFormat::MJPEG,
    }
}

fn fourcc_for(format: FrameFormat) -> FourCc {
    let tag = match format {
        FrameFormat::MJPEG => "MJPG",
        FrameFormat::YUYV => "YUYV",
        FrameFormat::NV12 => "NV12",
        FrameFormat::GRAY => "GREY",
        FrameFormat::RAWRGB => "RGB3",
        #[allow(unreachable_patterns)]
        _ => "RAW",
    };
    FourCc::parse(tag).unwrap_or(FourCc::MJPG)
}

/// Convert packed YUYV (4:2:2) to RGB24 using BT.601 coefficients
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Vec<u8> {
    let pixels = width as usize * height as usize;
    let mut rgb = Vec::with_capacity(pixels * 3);

    for chunk in yuyv.chunks_exact(4).take(pixels / 2) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        for y in [y0, y1] {
            let c = y as i32 - 16;
            let d = u as i32 - 128;
            let e = v as i32 - 128;

            let r = (298 * c + 409 * e + 128) >> 8;
            let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
            let b = (298 * c + 516 * d + 128) >> 8;

            rgb.push(r.clamp(0, 255) as u8);
            rgb.push(g.clamp(0, 255) as u8);
            rgb.push(b.clamp(0, 255) as u8);
        }
    }

    rgb
}
