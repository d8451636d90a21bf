//! Synthetic frame content

use crate::types::CameraFrame;

/// Gradient frame whose content shifts with `frame_number`, so consecutive
/// frames give an encoder real temporal changes to work with
pub fn synthetic_video_frame(frame_number: u64, width: u32, height: u32) -> CameraFrame {
    let mut data = vec![0u8; (width * height * 3) as usize];

    let base = (frame_number % 256) as u8;
    for (i, px) in data.chunks_exact_mut(3).enumerate() {
        let x = i as u32 % width;
        let y = i as u32 / width;
        px[0] = base.wrapping_add((x % 256) as u8);
        px[1] = base.wrapping_add((y % 256) as u8);
        px[2] = base.wrapping_add(((x + y) % 256) as u8);
    }

    CameraFrame::new(data, width, height, "synthetic".to_string())
}

/// Single-colour frame; cheap enough for full-HD devices in tests
pub fn solid_frame(frame_number: u64, width: u32, height: u32, device_id: String) -> CameraFrame {
    let shade = (frame_number % 256) as u8;
    CameraFrame::new(
        vec![shade; (width * height * 3) as usize],
        width,
        height,
        device_id,
    )
}
