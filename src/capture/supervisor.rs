//! Fan-out of session lifecycle calls to every capture worker

use super::{CaptureContext, CaptureWorker, DeviceState, WorkerStatus};
use crate::config::{CaptureConfig, ConnectionDescriptor};
use crate::errors::{ConfigError, RecordError};
use crate::events::channel_name;
use crate::platform::spawn_enumeration_diagnostic;
use crate::recording::RecordingStats;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Session-level lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorState {
    Unconfigured,
    Configured,
    Recording,
    /// Terminal for the current worker collection; `configure` starts a new one
    ShutDown,
}

/// Owns the workers of one session
pub struct CaptureSupervisor {
    ctx: CaptureContext,
    workers: Vec<CaptureWorker>,
    state: SupervisorState,
}

impl CaptureSupervisor {
    pub fn new(ctx: CaptureContext) -> Self {
        Self {
            ctx,
            workers: Vec::new(),
            state: SupervisorState::Unconfigured,
        }
    }

    pub fn context(&self) -> &CaptureContext {
        &self.ctx
    }

    /// Replace the context used by the next `configure`
    pub fn set_context(&mut self, ctx: CaptureContext) {
        self.ctx = ctx;
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn workers(&self) -> &[CaptureWorker] {
        &self.workers
    }

    pub fn device_states(&self) -> Vec<DeviceState> {
        self.workers
            .iter()
            .filter_map(|w| w.state().cloned())
            .collect()
    }

    pub fn status(&self) -> Vec<WorkerStatus> {
        self.workers.iter().map(CaptureWorker::status).collect()
    }

    /// Connect one worker per descriptor, keeping only those that connect.
    ///
    /// Existing workers are shut down first. Blocks while each device's frame
    /// rate is measured. Returns the number of connected devices; zero is a
    /// valid outcome.
    pub fn configure(&mut self, descriptors: &[ConnectionDescriptor]) -> usize {
        self.shutdown_all();

        for descriptor in descriptors {
            self.ctx
                .events
                .declare_channel(&channel_name(descriptor.device_index));
        }

        for descriptor in descriptors {
            let mut worker = CaptureWorker::new(descriptor.clone(), self.ctx.clone());
            match worker.connect() {
                Ok(_) => {
                    worker.run();
                    self.workers.push(worker);
                }
                Err(e) => {
                    log::warn!("{}; it will not be used", e);
                }
            }
        }

        log::info!("Connected to {} camera(s)", self.workers.len());
        self.state = SupervisorState::Configured;
        self.workers.len()
    }

    /// Validate `config`, then configure from its connection table.
    ///
    /// Validation failures are returned before any device is touched. A
    /// disabled configuration connects nothing.
    pub fn configure_from(&mut self, config: &CaptureConfig) -> Result<usize, ConfigError> {
        config.validate()?;

        self.ctx.overlay = config.timestamp_position;
        if !config.enabled {
            log::info!("Camera capture disabled in configuration");
            return Ok(self.configure(&[]));
        }

        spawn_enumeration_diagnostic(self.ctx.backend.clone(), config.alternate_backend);
        Ok(self.configure(&config.connections))
    }

    /// Start recording on every worker. Each result stands on its own.
    pub fn begin_recording(&mut self, prefix: &Path) -> Vec<(u32, Result<PathBuf, RecordError>)> {
        let results: Vec<_> = self
            .workers
            .iter_mut()
            .map(|w| (w.device_index(), w.start_recording(prefix)))
            .collect();

        if self.state == SupervisorState::Configured {
            self.state = SupervisorState::Recording;
        }
        results
    }

    /// Stop recording on every worker
    pub fn end_recording(&mut self) -> Vec<(u32, RecordingStats)> {
        let stats = self
            .workers
            .iter_mut()
            .filter_map(|w| {
                let index = w.device_index();
                w.stop_recording().map(|s| (index, s))
            })
            .collect();

        if self.state == SupervisorState::Recording {
            self.state = SupervisorState::Configured;
        }
        stats
    }

    /// Shut down and drop every worker. Safe at any time, any number of times.
    pub fn shutdown_all(&mut self) {
        for worker in self.workers.iter_mut() {
            worker.shutdown();
        }
        if !self.workers.is_empty() {
            log::info!("Disconnected {} camera(s)", self.workers.len());
        }
        self.workers.clear();
        self.state = SupervisorState::ShutDown;
    }
}

impl Drop for CaptureSupervisor {
    fn drop(&mut self) {
        self.shutdown_all();
    }
}
