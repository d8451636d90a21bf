//! Tests for a single capture worker driven by synthetic devices

mod common;

use common::*;
use crabcapture::capture::{CaptureWorker, WorkerPhase};
use crabcapture::config::{ConnectionDescriptor, OverlayPosition, DEFAULT_CODEC};
use crabcapture::errors::{ConnectError, RecordError};
use crabcapture::testing::{CountingSinkFactory, SyntheticBackend, SyntheticCamera};
use crabcapture::timing::RATE_PROBE_FRAMES;
use crabcapture::types::FourCc;
use tempfile::tempdir;

const PROBE: u64 = RATE_PROBE_FRAMES as u64;

#[test]
fn test_decimation_by_three_over_nine_ticks() {
    let dir = tempdir().unwrap();
    let (camera, mut driver) = gated_camera();
    let rig = rig(SyntheticBackend::new().with_camera(0, camera));

    let mut worker = CaptureWorker::new(
        ConnectionDescriptor::new(0, 640, 480).with_decimation(3),
        rig.ctx.clone(),
    );
    worker.connect().unwrap();
    worker.run();
    let path = worker.start_recording(&dir.path().join("run1")).unwrap();

    driver.tick(9);
    let events = take_events(&rig.events, 9);
    assert_eq!(values(&events), vec![0, 0, 1, 0, 0, 2, 0, 0, 3]);
    assert!(events.iter().all(|e| e.channel == "FrameIndex0" && e.device_index == 0));
    assert!(events.windows(2).all(|w| w[0].timestamp_us <= w[1].timestamp_us));

    let stats = worker.stop_recording().unwrap();
    assert_eq!(stats.video_frames, 3);
    assert_eq!(rig.sinks.frames_written(&path), 3);

    driver.close();
    worker.shutdown();
    assert_eq!(rig.backend.stats(0).unwrap().releases(), 1);
}

#[test]
fn test_restart_resets_frame_index() {
    let dir = tempdir().unwrap();
    let (camera, mut driver) = gated_camera();
    let rig = rig(SyntheticBackend::new().with_camera(0, camera));
    let stats = rig.backend.stats(0).unwrap();

    let mut worker = CaptureWorker::new(ConnectionDescriptor::new(0, 640, 480), rig.ctx.clone());
    worker.connect().unwrap();
    worker.run();

    worker.start_recording(&dir.path().join("a")).unwrap();
    driver.tick(3);
    assert_eq!(values(&take_events(&rig.events, 3)), vec![1, 2, 3]);
    worker.stop_recording();
    assert!(!worker.is_recording());

    // Not recording: frames are polled but nothing is emitted
    driver.tick(2);
    wait_until("idle frames", || stats.frames_read() == PROBE + 5);
    assert!(rig.events.try_recv().is_err());

    worker.start_recording(&dir.path().join("b")).unwrap();
    driver.tick(2);
    assert_eq!(values(&take_events(&rig.events, 2)), vec![1, 2]);

    driver.close();
    worker.shutdown();
}

#[test]
fn test_start_while_recording_closes_previous_file() {
    let dir = tempdir().unwrap();
    let (camera, mut driver) = gated_camera();
    let rig = rig(SyntheticBackend::new().with_camera(0, camera));

    let mut worker = CaptureWorker::new(ConnectionDescriptor::new(0, 640, 480), rig.ctx.clone());
    worker.connect().unwrap();

    let first = worker.start_recording(&dir.path().join("a")).unwrap();
    driver.tick(2);
    take_events(&rig.events, 2);

    let second = worker.start_recording(&dir.path().join("b")).unwrap();
    assert_ne!(first, second);
    assert_eq!(rig.sinks.finished(), vec![first.clone()]);
    assert_eq!(rig.sinks.frames_written(&first), 2);

    driver.tick(1);
    assert_eq!(values(&take_events(&rig.events, 1)), vec![1]);

    driver.close();
    worker.shutdown();
    assert_eq!(rig.sinks.finished(), vec![first, second]);
}

#[test]
fn test_start_recording_starts_the_loop() {
    let dir = tempdir().unwrap();
    let (camera, mut driver) = gated_camera();
    let rig = rig(SyntheticBackend::new().with_camera(0, camera));

    let mut worker = CaptureWorker::new(ConnectionDescriptor::new(0, 640, 480), rig.ctx.clone());
    worker.connect().unwrap();
    assert_eq!(worker.phase(), WorkerPhase::Connected);

    worker.start_recording(&dir.path().join("run")).unwrap();
    assert!(worker.is_running());
    driver.tick(1);
    assert_eq!(values(&take_events(&rig.events, 1)), vec![1]);

    driver.close();
    worker.shutdown();
}

#[test]
fn test_negotiated_resolution_is_kept() {
    let camera = fast_camera().with_native_resolution(640, 480);
    let rig = rig(SyntheticBackend::new().with_camera(0, camera));

    let mut worker = CaptureWorker::new(ConnectionDescriptor::new(0, 1920, 1080), rig.ctx.clone());
    let state = worker.connect().expect("mismatch must not fail the connect");

    assert_eq!((state.width, state.height), (640, 480));
    assert_eq!(state.codec, DEFAULT_CODEC);
    let fields: Vec<&str> = state.mismatches.iter().map(|m| m.field).collect();
    assert_eq!(fields, vec!["width", "height"]);
    assert_eq!(state.mismatches[0].requested, "1920");
    assert_eq!(state.mismatches[0].actual, "640");
    assert!(state.measured_fps.is_some());
    assert!(state.target_fps > 0.0);

    worker.shutdown();
}

#[test]
fn test_output_codec_does_not_follow_pixel_format() {
    let dir = tempdir().unwrap();
    let camera = fast_camera().with_native_pixel_format(FourCc::MJPG);
    let rig = rig(SyntheticBackend::new().with_camera(0, camera));

    let mut worker = CaptureWorker::new(
        ConnectionDescriptor::new(0, 320, 240).with_codec(FourCc::H264),
        rig.ctx.clone(),
    );
    let state = worker.connect().unwrap();
    assert_eq!(state.codec, FourCc::H264);
    assert_eq!(state.pixel_format, FourCc::MJPG);
    assert!(state.mismatches.is_empty());

    worker.start_recording(&dir.path().join("run")).unwrap();
    let opened = rig.sinks.opened();
    assert_eq!(opened.len(), 1);
    assert_eq!(opened[0].codec, FourCc::H264);

    worker.shutdown();
}

#[test]
fn test_pixel_format_mismatch_is_recorded() {
    let camera = fast_camera().with_native_pixel_format(FourCc::YUYV);
    let rig = rig(SyntheticBackend::new().with_camera(0, camera));

    let mut worker = CaptureWorker::new(
        ConnectionDescriptor::new(0, 320, 240).with_codec(FourCc::MJPG),
        rig.ctx.clone(),
    );
    let state = worker.connect().unwrap();
    assert_eq!(state.codec, FourCc::MJPG);
    assert_eq!(state.pixel_format, FourCc::YUYV);
    assert_eq!(state.mismatches.len(), 1);
    assert_eq!(state.mismatches[0].field, "pixel_format");
    assert_eq!(state.mismatches[0].actual, "YUYV");

    worker.shutdown();
}

#[test]
fn test_lost_handle_fails_the_connect() {
    let camera = fast_camera().losing_handle_on_configure();
    let rig = rig(SyntheticBackend::new().with_camera(0, camera));
    let device = rig.backend.stats(0).unwrap();

    let mut worker = CaptureWorker::new(ConnectionDescriptor::new(0, 640, 480), rig.ctx.clone());
    match worker.connect() {
        Err(ConnectError::DeviceUnavailable { index, .. }) => assert_eq!(index, 0),
        other => panic!("expected an unavailable device, got {:?}", other.map(|s| s.device_index)),
    }
    assert_eq!(worker.phase(), WorkerPhase::Idle);
    assert_eq!(device.opens(), 1);
    assert_eq!(device.releases(), 1);
    assert_eq!(device.frames_read(), 0);

    worker.shutdown();
    assert_eq!(device.releases(), 1);
}

#[test]
fn test_silent_device_with_rejected_format_fails_the_connect() {
    let (camera, mut driver) = SyntheticCamera::gated();
    driver.close();
    let rig = rig(SyntheticBackend::new().with_camera(0, camera.rejecting_configure()));
    let device = rig.backend.stats(0).unwrap();

    let mut worker = CaptureWorker::new(ConnectionDescriptor::new(0, 640, 480), rig.ctx.clone());
    assert!(matches!(
        worker.connect(),
        Err(ConnectError::DeviceUnavailable { index: 0, .. })
    ));
    assert_eq!(device.releases(), 1);
}

#[test]
fn test_rejected_format_request_falls_back_to_device_size() {
    let camera = fast_camera().rejecting_configure();
    let rig = rig(SyntheticBackend::new().with_camera(0, camera));

    let mut worker = CaptureWorker::new(ConnectionDescriptor::new(0, 1280, 720), rig.ctx.clone());
    let state = worker.connect().unwrap();
    assert_eq!((state.width, state.height), (640, 480));
    assert_eq!(state.mismatches.len(), 2);

    worker.shutdown();
}

#[test]
fn test_rate_probe_failure_uses_fallback_rate() {
    // The device stops delivering before the probe has its frames
    let (camera, mut driver) = SyntheticCamera::gated();
    driver.tick(10);
    driver.close();
    let rig = rig(SyntheticBackend::new().with_camera(0, camera));

    let mut worker = CaptureWorker::new(
        ConnectionDescriptor::new(0, 640, 480).with_decimation(2),
        rig.ctx.clone(),
    );
    let state = worker.connect().expect("a failed probe must not fail the connect");
    assert!(state.measured_fps.is_none());
    // The assumed device rate still goes through the decimation
    assert_eq!(state.target_fps, 15.0);

    worker.shutdown();
    assert_eq!(rig.backend.stats(0).unwrap().releases(), 1);
}

#[test]
fn test_sink_failure_keeps_polling() {
    let dir = tempdir().unwrap();
    let (camera, mut driver) = gated_camera();
    let rig = rig_with_sinks(
        SyntheticBackend::new().with_camera(0, camera),
        CountingSinkFactory::new().failing_codec(FourCc::MJPG),
    );
    let stats = rig.backend.stats(0).unwrap();

    let mut worker = CaptureWorker::new(
        ConnectionDescriptor::new(0, 640, 480)
            .with_codec(FourCc::MJPG)
            .with_display(true),
        rig.ctx.clone(),
    );
    worker.connect().unwrap();
    worker.run();

    match worker.start_recording(&dir.path().join("run1")) {
        Err(RecordError::SinkUnavailable { index, path, .. }) => {
            assert_eq!(index, 0);
            assert!(path.ends_with("run1_0_vid.mp4"));
        }
        other => panic!("expected SinkUnavailable, got {:?}", other),
    }
    assert!(!worker.is_recording());
    assert!(worker.is_running());

    driver.tick(3);
    wait_until("frames polled", || stats.frames_read() == PROBE + 3);
    wait_until("preview updated", || rig.preview.frames_shown("Camera 0") == 3);
    assert!(rig.events.try_recv().is_err());

    driver.close();
    worker.shutdown();
    assert!(rig.preview.open_windows().is_empty());
}

#[test]
fn test_failed_reads_are_not_ticks() {
    let dir = tempdir().unwrap();
    let (camera, mut driver) = gated_camera();
    let rig = rig(SyntheticBackend::new().with_camera(0, camera));

    let mut worker = CaptureWorker::new(
        ConnectionDescriptor::new(0, 640, 480).with_decimation(2),
        rig.ctx.clone(),
    );
    worker.connect().unwrap();
    worker.start_recording(&dir.path().join("run1")).unwrap();

    driver.fail(2);
    driver.tick(2);
    driver.fail(1);
    driver.tick(2);
    assert_eq!(values(&take_events(&rig.events, 4)), vec![0, 1, 0, 2]);

    driver.close();
    worker.shutdown();
}

#[test]
fn test_overlay_is_drawn_on_previewed_frames() {
    let (camera, mut driver) = gated_camera();
    let rig = rig(SyntheticBackend::new().with_camera(0, camera));
    let ctx = rig.ctx.clone().with_overlay(OverlayPosition::UpperLeft);

    let mut worker = CaptureWorker::new(
        ConnectionDescriptor::new(0, 320, 240).with_display(true),
        ctx,
    );
    let state = worker.connect().unwrap();
    assert_eq!(state.overlay.unwrap().anchor(), (10, 10));
    worker.run();

    driver.tick(1);
    wait_until("preview frame", || rig.preview.frames_shown("Camera 0") == 1);
    let frame = rig.preview.latest("Camera 0").unwrap();

    // Frame 61 is a solid shade of 61; the text is white
    assert_eq!(frame.data[0], 61);
    let text_box = (10..24u32).flat_map(|y| (10..60u32).map(move |x| (x, y)));
    let lit = text_box
        .filter(|&(x, y)| frame.data[((y * 320 + x) * 3) as usize] == 255)
        .count();
    assert!(lit > 0, "timestamp text should be visible");

    driver.close();
    worker.shutdown();
}

#[test]
fn test_shutdown_before_run_and_twice() {
    let rig = rig(SyntheticBackend::new().with_camera(0, fast_camera()));
    let stats = rig.backend.stats(0).unwrap();

    let mut never_connected = CaptureWorker::new(ConnectionDescriptor::new(7, 640, 480), rig.ctx.clone());
    never_connected.shutdown();
    never_connected.shutdown();
    assert_eq!(never_connected.phase(), WorkerPhase::Idle);

    let mut worker = CaptureWorker::new(ConnectionDescriptor::new(0, 640, 480), rig.ctx.clone());
    worker.connect().unwrap();
    worker.shutdown();
    worker.shutdown();
    assert_eq!(worker.phase(), WorkerPhase::Released);
    assert_eq!(stats.releases(), 1);

    // run after shutdown does nothing
    worker.run();
    assert!(!worker.is_running());
}

#[test]
fn test_shutdown_joins_running_loop_before_release() {
    let dir = tempdir().unwrap();
    let rig = rig(SyntheticBackend::new().with_camera(0, fast_camera()));
    let stats = rig.backend.stats(0).unwrap();

    let mut worker = CaptureWorker::new(ConnectionDescriptor::new(0, 64, 48), rig.ctx.clone());
    worker.connect().unwrap();
    worker.start_recording(&dir.path().join("run1")).unwrap();
    take_events(&rig.events, 5);

    worker.shutdown();
    let read_at_release = stats.frames_read();
    assert_eq!(stats.releases(), 1);
    assert!(!worker.is_recording());

    std::thread::sleep(std::time::Duration::from_millis(20));
    assert_eq!(stats.frames_read(), read_at_release, "no reads after release");
}

#[test]
fn test_recording_requires_connection() {
    let dir = tempdir().unwrap();
    let rig = rig(SyntheticBackend::new());

    let mut worker = CaptureWorker::new(ConnectionDescriptor::new(3, 640, 480), rig.ctx.clone());
    assert!(worker.connect().is_err());
    assert!(matches!(
        worker.start_recording(dir.path()),
        Err(RecordError::NotConnected { index: 3 })
    ));
    assert!(worker.stop_recording().is_none());
}

#[test]
fn test_status_reports_active_file() {
    let dir = tempdir().unwrap();
    let (camera, mut driver) = gated_camera();
    let rig = rig(SyntheticBackend::new().with_camera(0, camera));

    let mut worker = CaptureWorker::new(ConnectionDescriptor::new(0, 640, 480), rig.ctx.clone());
    worker.connect().unwrap();
    let path = worker.start_recording(&dir.path().join("run1")).unwrap();
    driver.tick(2);
    take_events(&rig.events, 2);

    let status = worker.status();
    assert_eq!(status.phase, WorkerPhase::Running);
    assert!(status.recording);
    assert_eq!(status.output, Some(path));
    assert_eq!(status.frames_written, 2);

    driver.close();
    worker.shutdown();
    assert!(!worker.status().recording);
}
