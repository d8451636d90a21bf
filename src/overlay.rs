//! Date/time text overlay drawn onto retained frames
//!
//! Uses a small built-in 5x7 bitmap font that covers the characters of the
//! `MM/dd/yy hh:mm:ss` timestamp, so no font files are needed at runtime.

use crate::config::OverlayPosition;
use crate::timing::timestamp_text;
use crate::types::CameraFrame;
use chrono::Local;

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;
const GLYPH_ADVANCE: u32 = GLYPH_WIDTH + 1;

/// Pixel scale applied to the bitmap font
pub const TEXT_SCALE: u32 = 2;

/// Distance kept between the text box and the frame edges
pub const TEXT_MARGIN: u32 = 10;

/// Length of a rendered timestamp, used to size the text box up front
const TIMESTAMP_CHARS: u32 = 17;

const TEXT_COLOR: [u8; 3] = [255, 255, 255];

/// Text overlay anchored in one corner of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextOverlay {
    position: OverlayPosition,
    anchor: (u32, u32),
}

impl TextOverlay {
    /// Compute the anchor for a frame size; `None` when the overlay is disabled
    pub fn new(position: OverlayPosition, frame_width: u32, frame_height: u32) -> Option<Self> {
        let (text_width, text_height) = text_size(TIMESTAMP_CHARS);

        let right = frame_width.saturating_sub(TEXT_MARGIN + text_width);
        let bottom = frame_height.saturating_sub(TEXT_MARGIN + text_height);

        let anchor = match position {
            OverlayPosition::None => return None,
            OverlayPosition::UpperRight => (right, TEXT_MARGIN),
            OverlayPosition::UpperLeft => (TEXT_MARGIN, TEXT_MARGIN),
            OverlayPosition::LowerRight => (right, bottom),
            OverlayPosition::LowerLeft => (TEXT_MARGIN, bottom),
        };

        Some(Self { position, anchor })
    }

    pub fn position(&self) -> OverlayPosition {
        self.position
    }

    /// Top-left corner of the text box in pixels
    pub fn anchor(&self) -> (u32, u32) {
        self.anchor
    }

    /// Draw the current local time onto the frame
    pub fn stamp(&self, frame: &mut CameraFrame) {
        self.draw(frame, &timestamp_text(&Local::now()));
    }

    /// Draw `text` at the anchor, clipped to the frame
    pub fn draw(&self, frame: &mut CameraFrame, text: &str) {
        if !frame.is_valid() {
            return;
        }

        let (x0, y0) = self.anchor;
        for (i, ch) in text.chars().enumerate() {
            let origin_x = x0 + i as u32 * GLYPH_ADVANCE * TEXT_SCALE;
            if origin_x >= frame.width {
                break;
            }
            draw_glyph(frame, glyph(ch), origin_x, y0);
        }
    }
}

/// Rendered size in pixels of a string of `chars` characters
pub fn text_size(chars: u32) -> (u32, u32) {
    if chars == 0 {
        return (0, 0);
    }
    (
        (chars * GLYPH_ADVANCE - 1) * TEXT_SCALE,
        GLYPH_HEIGHT * TEXT_SCALE,
    )
}

fn draw_glyph(frame: &mut CameraFrame, rows: [u8; 7], origin_x: u32, origin_y: u32) {
    let width = frame.width as usize;
    for (row, bits) in rows.iter().enumerate() {
        for col in 0..GLYPH_WIDTH {
            if bits & (0x10 >> col) == 0 {
                continue;
            }
            for dy in 0..TEXT_SCALE {
                for dx in 0..TEXT_SCALE {
                    let x = origin_x + col * TEXT_SCALE + dx;
                    let y = origin_y + row as u32 * TEXT_SCALE + dy;
                    if x >= frame.width || y >= frame.height {
                        continue;
                    }
                    let idx = (y as usize * width + x as usize) * 3;
                    frame.data[idx..idx + 3].copy_from_slice(&TEXT_COLOR);
                }
            }
        }
    }
}

fn glyph(ch: char) -> [u8; 7] {
    match ch {
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '/' => [0x01, 0x01, 0x02, 0x04, 0x08, 0x10, 0x10],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        _ => [0; 7],
    }
}
