//! Preview surfaces for retained frames of devices with display enabled

use crate::types::CameraFrame;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Window name used for a device's preview
pub fn window_name(device_index: u32) -> String {
    format!("Camera {}", device_index)
}

/// Where retained frames go when a connection has display enabled.
/// Called from the polling threads.
pub trait PreviewSurface: Send + Sync {
    fn show(&self, window_id: &str, frame: &CameraFrame);

    /// Tear down the window once its device has shut down
    fn close(&self, _window_id: &str) {}
}

/// Discards every frame
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPreview;

impl PreviewSurface for NullPreview {
    fn show(&self, _window_id: &str, _frame: &CameraFrame) {}
}

/// Keeps the most recent frame per window for a host UI to poll
#[derive(Debug, Default)]
pub struct LatestFramePreview {
    windows: Mutex<HashMap<String, PreviewSlot>>,
}

#[derive(Debug)]
struct PreviewSlot {
    frame: CameraFrame,
    shown: u64,
}

impl LatestFramePreview {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent frame shown in `window_id`
    pub fn latest(&self, window_id: &str) -> Option<CameraFrame> {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(window_id)
            .map(|slot| slot.frame.clone())
    }

    /// Number of frames shown in `window_id` since it was opened
    pub fn frames_shown(&self, window_id: &str) -> u64 {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(window_id)
            .map_or(0, |slot| slot.shown)
    }

    pub fn open_windows(&self) -> Vec<String> {
        let windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = windows.keys().cloned().collect();
        names.sort();
        names
    }
}

impl PreviewSurface for LatestFramePreview {
    fn show(&self, window_id: &str, frame: &CameraFrame) {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        match windows.get_mut(window_id) {
            Some(slot) => {
                slot.frame = frame.clone();
                slot.shown += 1;
            }
            None => {
                windows.insert(
                    window_id.to_string(),
                    PreviewSlot {
                        frame: frame.clone(),
                        shown: 1,
                    },
                );
            }
        }
    }

    fn close(&self, window_id: &str) {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(window_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_frame_replaced() {
        let preview = LatestFramePreview::new();
        let window = window_name(2);
        assert_eq!(window, "Camera 2");

        preview.show(&window, &CameraFrame::new(vec![1; 3], 1, 1, "2".to_string()));
        preview.show(&window, &CameraFrame::new(vec![9; 3], 1, 1, "2".to_string()));

        assert_eq!(preview.latest(&window).unwrap().data, vec![9; 3]);
        assert_eq!(preview.frames_shown(&window), 2);
        assert_eq!(preview.open_windows(), vec![window.clone()]);

        preview.close(&window);
        assert!(preview.latest(&window).is_none());
        assert_eq!(preview.frames_shown(&window), 0);
    }
}
