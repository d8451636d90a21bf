//! crabcapture: multi-camera capture and recording for timed sessions
//!
//! Each configured camera gets its own polling thread that decimates frames,
//! stamps an optional date/time overlay, feeds a preview surface and, while a
//! run is recording, writes the retained frames to a per-device file and
//! emits a frame index event on every poll tick. The events let recorded
//! video be aligned with other signals afterwards.
//!
//! # Features
//! - Independent worker per device; one stalled camera never blocks the rest
//! - Per-device decimation, codec selection and preview
//! - Frame index events on `FrameIndex<n>` channels
//! - H.264/MP4 recording (feature `recording`) and Motion-JPEG streams
//! - Tauri plugin commands (feature `plugin`)
//!
//! # Usage
//! ```rust,ignore
//! use crabcapture::capture::{CaptureContext, CaptureSupervisor};
//! use crabcapture::config::CaptureConfig;
//!
//! let config = CaptureConfig::load_layered("crabcapture.toml")?;
//! let mut supervisor = CaptureSupervisor::new(CaptureContext::native());
//! supervisor.configure_from(&config)?;
//!
//! supervisor.begin_recording(&config.output.run_prefix(1));
//! // ... run ...
//! supervisor.end_recording();
//! supervisor.shutdown_all();
//! ```
pub mod capture;
pub mod config;
pub mod errors;
pub mod events;
pub mod overlay;
pub mod platform;
pub mod preview;
pub mod recording;
pub mod timing;
pub mod types;

#[cfg(feature = "plugin")]
pub mod commands;

// Testing utilities - synthetic devices and sinks for offline testing
pub mod testing;

// Re-exports for convenience
pub use capture::{CaptureContext, CaptureSupervisor, CaptureWorker, DeviceState};
pub use config::{CaptureConfig, ConnectionDescriptor, OverlayPosition};
pub use errors::{CameraError, ConfigError, ConnectError, RecordError};
pub use types::{CameraDeviceInfo, CameraFrame, FourCc};

#[cfg(feature = "plugin")]
use tauri::{
    plugin::{Builder, TauriPlugin},
    Runtime,
};

/// Initialize the crabcapture plugin with all commands
#[cfg(feature = "plugin")]
pub fn init<R: Runtime>() -> TauriPlugin<R> {
    Builder::new("crabcapture")
        .invoke_handler(tauri::generate_handler![
            commands::configure_capture,
            commands::begin_recording,
            commands::end_recording,
            commands::shutdown_capture,
            commands::get_capture_status,
            commands::poll_frame_events,
            commands::get_preview_frame,
        ])
        .build()
}

/// Initialize logging; `RUST_LOG` wins when set
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "crabcapture=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
        platform: std::env::consts::OS.to_string(),
        h264_recording: cfg!(feature = "recording"),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub platform: String,
    /// Whether H.264/MP4 sinks were compiled in
    pub h264_recording: bool,
}
