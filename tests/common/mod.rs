//! Shared rig for capture engine integration tests

#![allow(dead_code)]

use crabcapture::capture::CaptureContext;
use crabcapture::events::{ChannelEventSink, FrameEvent};
use crabcapture::platform::DeviceBackend;
use crabcapture::preview::LatestFramePreview;
use crabcapture::recording::SinkFactory;
use crabcapture::testing::{CountingSinkFactory, SyntheticBackend, SyntheticCamera, TickDriver};
use crabcapture::timing::RATE_PROBE_FRAMES;
use crossbeam_channel::Receiver;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const WAIT: Duration = Duration::from_secs(10);

pub struct Rig {
    pub backend: Arc<SyntheticBackend>,
    pub sinks: Arc<CountingSinkFactory>,
    pub preview: Arc<LatestFramePreview>,
    pub events: Receiver<FrameEvent>,
    pub ctx: CaptureContext,
}

pub fn rig(backend: SyntheticBackend) -> Rig {
    rig_with_sinks(backend, CountingSinkFactory::new())
}

pub fn rig_with_sinks(backend: SyntheticBackend, sinks: CountingSinkFactory) -> Rig {
    let backend = Arc::new(backend);
    let sinks = Arc::new(sinks);
    let preview = Arc::new(LatestFramePreview::new());
    let (event_sink, events) = ChannelEventSink::new();

    let ctx = CaptureContext::new(
        backend.clone() as Arc<dyn DeviceBackend>,
        sinks.clone() as Arc<dyn SinkFactory>,
    )
    .with_events(Arc::new(event_sink))
    .with_preview(preview.clone());

    Rig {
        backend,
        sinks,
        preview,
        events,
        ctx,
    }
}

/// Gated camera with the frames for the connect-time rate probe already queued
pub fn gated_camera() -> (SyntheticCamera, TickDriver) {
    let (camera, driver) = SyntheticCamera::gated();
    driver.tick(RATE_PROBE_FRAMES as usize);
    (camera, driver)
}

pub fn fast_camera() -> SyntheticCamera {
    SyntheticCamera::free_running(Duration::from_millis(1))
}

/// Receive exactly `n` events or panic
pub fn take_events(events: &Receiver<FrameEvent>, n: usize) -> Vec<FrameEvent> {
    (0..n)
        .map(|i| {
            events
                .recv_timeout(WAIT)
                .unwrap_or_else(|_| panic!("timed out waiting for event {} of {}", i + 1, n))
        })
        .collect()
}

pub fn values(events: &[FrameEvent]) -> Vec<u32> {
    events.iter().map(|e| e.value).collect()
}

/// Poll `condition` until it holds or panic
pub fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let started = Instant::now();
    while !condition() {
        if started.elapsed() > WAIT {
            panic!("timed out waiting for {}", what);
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}
