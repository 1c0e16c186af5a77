// SPDX-License-Identifier: GPL-3.0-only

//! Frame sources for the virtual camera
//!
//! Frames come either from an image file (looped as a still) or from a
//! generated test pattern.

use crate::backends::camera::types::{BackendError, BackendResult, CameraFrame, CameraPosition};
use crate::constants::files;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Load an image file as a single RGBA frame
pub fn load_image_as_frame(path: &Path) -> BackendResult<CameraFrame> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    if !files::is_image_extension(extension) {
        return Err(BackendError::Other(format!(
            "Unsupported image format: {}",
            path.display()
        )));
    }

    info!(path = %path.display(), "Loading image file");

    let img = image::open(path).map_err(|e| {
        BackendError::Other(format!("Failed to load image '{}': {}", path.display(), e))
    })?;

    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    info!(width, height, "Image loaded successfully");

    Ok(CameraFrame::from_rgba(width, height, rgba.into_raw(), 0))
}

/// Re-stamp a still so it looks like a fresh frame of the live stream
pub fn restamp(still: &CameraFrame, sequence: u64) -> CameraFrame {
    CameraFrame {
        data: Arc::clone(&still.data),
        sequence,
        captured_at: std::time::Instant::now(),
        ..*still
    }
}

/// Moving colour-bar test pattern
///
/// Bars scroll by one pixel per frame; front cameras get a warmer tint so
/// tests and demos can tell the two positions apart.
pub fn test_pattern(width: u32, height: u32, sequence: u64, position: CameraPosition) -> CameraFrame {
    const BARS: [[u8; 3]; 7] = [
        [235, 235, 235],
        [235, 235, 16],
        [16, 235, 235],
        [16, 235, 16],
        [235, 16, 235],
        [235, 16, 16],
        [16, 16, 235],
    ];
    let tint: u8 = match position {
        CameraPosition::Back => 0,
        CameraPosition::Front => 20,
    };

    let bar_width = (width / BARS.len() as u32).max(1);
    let shift = (sequence % width.max(1) as u64) as u32;
    let mut data = Vec::with_capacity(width as usize * height as usize * 4);
    for _y in 0..height {
        for x in 0..width {
            let bar = (((x + shift) % width.max(1)) / bar_width).min(BARS.len() as u32 - 1);
            let [r, g, b] = BARS[bar as usize];
            data.extend_from_slice(&[r.saturating_add(tint), g, b.saturating_sub(tint), 255]);
        }
    }
    CameraFrame::from_rgba(width, height, data, sequence)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_dimensions_and_motion() {
        let first = test_pattern(70, 10, 0, CameraPosition::Back);
        let second = test_pattern(70, 10, 5, CameraPosition::Back);
        assert_eq!(first.data.len(), 70 * 10 * 4);
        assert_eq!(first.rgba_at(0, 0), Some([235, 235, 235, 255]));
        assert_ne!(first.rgba_at(8, 0), second.rgba_at(8, 0));
    }

    #[test]
    fn test_load_image_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("still.png");
        image::RgbaImage::from_pixel(6, 4, image::Rgba([10, 20, 30, 255]))
            .save(&path)
            .unwrap();

        let frame = load_image_as_frame(&path).unwrap();
        assert_eq!((frame.width, frame.height), (6, 4));
        assert_eq!(frame.rgba_at(5, 3), Some([10, 20, 30, 255]));

        let restamped = restamp(&frame, 9);
        assert_eq!(restamped.sequence, 9);
        assert_eq!(restamped.width, 6);
    }

    #[test]
    fn test_rejects_non_image_extension() {
        assert!(load_image_as_frame(Path::new("/tmp/clip.mp4")).is_err());
    }
}
