//! Tauri commands driving a capture session
//!
//! One process-wide supervisor backs every command. Calls that may block
//! (configure measures each device's frame rate, shutdown joins threads)
//! run on tokio's blocking pool.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tauri::command;

use crate::capture::{CaptureContext, CaptureSupervisor, DeviceState, SupervisorState, WorkerStatus};
use crate::config::CaptureConfig;
use crate::events::{ChannelEventSink, FrameEvent};
use crate::preview::{window_name, LatestFramePreview};
use crate::recording::RecordingStats;
use crate::types::CameraFrame;
use crossbeam_channel::Receiver;

struct Session {
    supervisor: CaptureSupervisor,
    events: Receiver<FrameEvent>,
}

lazy_static::lazy_static! {
    static ref PREVIEW: Arc<LatestFramePreview> = Arc::new(LatestFramePreview::new());
    static ref SESSION: Mutex<Session> = {
        let (sink, events) = ChannelEventSink::new();
        let ctx = CaptureContext::native()
            .with_events(Arc::new(sink))
            .with_preview(PREVIEW.clone());
        Mutex::new(Session {
            supervisor: CaptureSupervisor::new(ctx),
            events,
        })
    };
}

fn session() -> MutexGuard<'static, Session> {
    SESSION.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn blocking<T, F>(f: F) -> Result<T, String>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| format!("Capture task failed: {}", e))
}

/// Per-device outcome of `begin_recording`
#[derive(Debug, Clone, Serialize)]
pub struct RecordingOutcome {
    pub device_index: u32,
    pub path: Option<PathBuf>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaptureStatus {
    pub state: SupervisorState,
    pub workers: Vec<WorkerStatus>,
    pub devices: Vec<DeviceState>,
}

/// Validate a configuration and connect its devices.
/// Returns the number of connected cameras.
#[command]
pub async fn configure_capture(config: CaptureConfig) -> Result<usize, String> {
    log::info!(
        "Configuring capture for {} connection(s)",
        config.connections.len()
    );
    blocking(move || session().supervisor.configure_from(&config))
        .await?
        .map_err(|e| e.to_string())
}

/// Start recording on every connected device with `prefix` as the file stem
#[command]
pub async fn begin_recording(prefix: String) -> Result<Vec<RecordingOutcome>, String> {
    let results = blocking(move || session().supervisor.begin_recording(&PathBuf::from(prefix))).await?;

    Ok(results
        .into_iter()
        .map(|(device_index, result)| match result {
            Ok(path) => RecordingOutcome {
                device_index,
                path: Some(path),
                error: None,
            },
            Err(e) => RecordingOutcome {
                device_index,
                path: None,
                error: Some(e.to_string()),
            },
        })
        .collect())
}

#[command]
pub async fn end_recording() -> Result<Vec<RecordingStats>, String> {
    let stats = blocking(|| session().supervisor.end_recording()).await?;
    Ok(stats.into_iter().map(|(_, s)| s).collect())
}

#[command]
pub async fn shutdown_capture() -> Result<(), String> {
    blocking(|| session().supervisor.shutdown_all()).await
}

#[command]
pub async fn get_capture_status() -> Result<CaptureStatus, String> {
    let session = session();
    Ok(CaptureStatus {
        state: session.supervisor.state(),
        workers: session.supervisor.status(),
        devices: session.supervisor.device_states(),
    })
}

/// Drain pending frame index events, at most `max` of them
#[command]
pub async fn poll_frame_events(max: Option<usize>) -> Result<Vec<FrameEvent>, String> {
    let session = session();
    let limit = max.unwrap_or(usize::MAX);
    Ok(session.events.try_iter().take(limit).collect())
}

/// Latest retained frame of a device with display enabled
#[command]
pub async fn get_preview_frame(device_index: u32) -> Result<Option<CameraFrame>, String> {
    Ok(PREVIEW.latest(&window_name(device_index)))
}
