//! Timing utilities: event timebase, frame-rate probing and overlay timestamps

use crate::errors::CameraError;
use chrono::{DateTime, TimeZone};
use std::sync::Arc;
use std::time::Instant;

/// Frames read when measuring a device's achievable rate
pub const RATE_PROBE_FRAMES: u32 = 60;

/// Device rate assumed when a measurement yields nothing usable
pub const FALLBACK_DEVICE_FPS: f64 = 30.0;

/// Bounds applied to a measured capture rate
pub const MIN_MEASURED_FPS: f64 = 1.0;
pub const MAX_MEASURED_FPS: f64 = 240.0;

/// Monotonic clock for event timestamps
///
/// All devices of a session share one clock so that their
/// frame index events land on the same timebase.
#[derive(Debug, Clone)]
pub struct PTSClock {
    start: Arc<Instant>,
}

impl PTSClock {
    /// Create a new clock with the current instant as time zero
    pub fn new() -> Self {
        Self {
            start: Arc::new(Instant::now()),
        }
    }

    /// Elapsed time since clock creation in seconds
    #[inline]
    pub fn pts(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Elapsed time since clock creation in microseconds
    #[inline]
    pub fn pts_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}

impl Default for PTSClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Read `frames` frames back to back and return the rate they arrived at.
///
/// Blocks for as long as the device takes to deliver them. The first read
/// error aborts the probe.
pub fn probe_frame_rate<F, T>(frames: u32, mut read: F) -> Result<f64, CameraError>
where
    F: FnMut() -> Result<T, CameraError>,
{
    if frames == 0 {
        return Err(CameraError::CaptureError(
            "rate probe needs at least one frame".to_string(),
        ));
    }

    let started = Instant::now();
    for _ in 0..frames {
        read()?;
    }
    let elapsed = started.elapsed().as_secs_f64();

    Ok(frames as f64 / elapsed)
}

/// Turn a measured device rate into the per-file target rate for a decimation factor
pub fn target_fps(measured_fps: Option<f64>, decimation: u32) -> f64 {
    let device_fps = match measured_fps {
        Some(fps) if fps.is_finite() && fps > 0.0 => fps.clamp(MIN_MEASURED_FPS, MAX_MEASURED_FPS),
        _ => FALLBACK_DEVICE_FPS,
    };
    device_fps / decimation.max(1) as f64
}

/// Overlay text in `MM/dd/yy hh:mm:ss` form
pub fn timestamp_text<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format("%m/%d/%y %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;

    #[test]
    fn test_pts_is_monotonic() {
        let clock = PTSClock::new();
        let a = clock.pts_us();
        std::thread::sleep(Duration::from_millis(2));
        assert!(clock.pts_us() > a);
        assert!(clock.pts() > 0.0);
    }

    #[test]
    fn test_probe_counts_reads() {
        let mut reads = 0;
        let fps = probe_frame_rate(10, || {
            reads += 1;
            std::thread::sleep(Duration::from_millis(2));
            Ok::<_, CameraError>(())
        })
        .unwrap();
        assert_eq!(reads, 10);
        assert!(fps > 0.0 && fps <= 500.0);
    }

    #[test]
    fn test_probe_stops_on_error() {
        let mut reads = 0;
        let result = probe_frame_rate(60, || {
            reads += 1;
            if reads == 3 {
                Err(CameraError::CaptureError("gone".to_string()))
            } else {
                Ok(())
            }
        });
        assert!(result.is_err());
        assert_eq!(reads, 3);
    }

    #[test]
    fn test_target_fps_divides_by_decimation() {
        assert_eq!(target_fps(Some(30.0), 1), 30.0);
        assert_eq!(target_fps(Some(30.0), 3), 10.0);
        assert_eq!(target_fps(Some(10_000.0), 2), MAX_MEASURED_FPS / 2.0);
        assert_eq!(target_fps(Some(f64::INFINITY), 1), FALLBACK_DEVICE_FPS);
        assert_eq!(target_fps(None, 1), FALLBACK_DEVICE_FPS);
    }

    #[test]
    fn test_fallback_rate_is_decimated_too() {
        assert_eq!(target_fps(None, 3), FALLBACK_DEVICE_FPS / 3.0);
        assert_eq!(target_fps(Some(f64::NAN), 2), FALLBACK_DEVICE_FPS / 2.0);
        assert_eq!(target_fps(None, 0), FALLBACK_DEVICE_FPS);
    }

    #[test]
    fn test_timestamp_text_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 2).unwrap();
        assert_eq!(timestamp_text(&at), "03/07/24 09:05:02");
    }
}
