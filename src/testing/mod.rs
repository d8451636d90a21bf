//! Testing utilities for crabcapture
//!
//! Synthetic devices and sinks so the capture engine can be driven
//! deterministically without camera hardware or encoders.

pub mod counting_sink;
pub mod synthetic_data;
pub mod synthetic_device;

pub use counting_sink::CountingSinkFactory;
pub use synthetic_data::{solid_frame, synthetic_video_frame};
pub use synthetic_device::{DeviceStats, SyntheticBackend, SyntheticCamera, TickDriver};
