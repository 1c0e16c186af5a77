// SPDX-License-Identifier: GPL-3.0-only

//! Barcode detectors
//!
//! The default detector decodes QR codes with `rqrr`. Frames are converted
//! to luma and downscaled first; bounds are reported in full-frame pixels.

use super::{BarcodeDetection, BarcodeType};
use crate::backends::camera::types::CameraFrame;
use crate::constants::barcode::MAX_DIMENSION;
use crate::pipelines::display::PixelRect;
use tracing::{debug, trace};

/// A barcode decoder the scanner can run on live frames
///
/// `detect` is called on the blocking pool and may be slow.
pub trait BarcodeDetector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether `detect` honours the type filter itself
    ///
    /// When false the scanner passes every result through unfiltered.
    fn supports_type_filter(&self) -> bool;

    fn detect(&self, frame: &CameraFrame, types: &[BarcodeType]) -> Result<Vec<BarcodeDetection>, String>;
}

/// QR code detector
///
/// Optimized for real-time processing with frame downscaling.
#[derive(Debug, Clone, Copy)]
pub struct QrDetector {
    /// Frames are downscaled so neither side exceeds this
    max_dimension: u32,
}

impl Default for QrDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl QrDetector {
    pub fn new() -> Self {
        Self {
            max_dimension: MAX_DIMENSION,
        }
    }

    pub fn with_max_dimension(max_dimension: u32) -> Self {
        Self {
            max_dimension: max_dimension.max(1),
        }
    }
}

impl BarcodeDetector for QrDetector {
    fn name(&self) -> &'static str {
        "rqrr"
    }

    fn supports_type_filter(&self) -> bool {
        false
    }

    fn detect(&self, frame: &CameraFrame, _types: &[BarcodeType]) -> Result<Vec<BarcodeDetection>, String> {
        if frame.width == 0 || frame.height == 0 {
            return Ok(Vec::new());
        }
        let start = std::time::Instant::now();

        let (luma, proc_width, proc_height, (x_scale, y_scale)) =
            downscaled_luma(frame, self.max_dimension);
        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
            proc_width as usize,
            proc_height as usize,
            |x, y| luma[y * proc_width as usize + x],
        );
        let grids = prepared.detect_grids();
        trace!(
            proc_width,
            proc_height,
            x_scale,
            y_scale,
            grids = grids.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "QR grid search complete"
        );

        let mut detections = Vec::with_capacity(grids.len());
        for grid in grids {
            let content = match grid.decode() {
                Ok((_meta, content)) => content,
                Err(e) => {
                    debug!(error = %e, "Failed to decode QR code");
                    continue;
                }
            };

            let corners: Vec<(f32, f32)> = grid
                .bounds
                .iter()
                .map(|p| (p.x as f32 * x_scale, p.y as f32 * y_scale))
                .collect();
            let Some(bounds) = PixelRect::bounding(&corners) else {
                continue;
            };

            debug!(content = %content, x = bounds.x, y = bounds.y, "Detected QR code");
            detections.push(BarcodeDetection {
                display_value: content.clone(),
                value: content,
                kind: BarcodeType::QrCode,
                confidence: 1.0,
                bounds,
            });
        }

        Ok(detections)
    }
}

/// Luma plane downscaled so neither side exceeds `max_dimension`
///
/// Returns the plane, its size and the per-axis factors mapping it back to
/// the frame.
fn downscaled_luma(frame: &CameraFrame, max_dimension: u32) -> (Vec<u8>, u32, u32, (f32, f32)) {
    let (width, height) = (frame.width, frame.height);
    if width <= max_dimension && height <= max_dimension {
        let mut luma = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                luma.push(frame.luma_at(x, y));
            }
        }
        return (luma, width, height, (1.0, 1.0));
    }

    let scale = (width as f32 / max_dimension as f32).max(height as f32 / max_dimension as f32);
    let dst_width = ((width as f32 / scale) as u32).max(1);
    let dst_height = ((height as f32 / scale) as u32).max(1);
    let x_ratio = width as f32 / dst_width as f32;
    let y_ratio = height as f32 / dst_height as f32;

    let mut luma = Vec::with_capacity(dst_width as usize * dst_height as usize);
    for y in 0..dst_height {
        for x in 0..dst_width {
            let src_x = x as f32 * x_ratio;
            let src_y = y as f32 * y_ratio;
            let x0 = src_x as u32;
            let y0 = src_y as u32;
            let x1 = (x0 + 1).min(width - 1);
            let y1 = (y0 + 1).min(height - 1);
            let x_frac = src_x - x0 as f32;
            let y_frac = src_y - y0 as f32;

            // Bilinear interpolation
            let p00 = frame.luma_at(x0, y0) as f32;
            let p01 = frame.luma_at(x1, y0) as f32;
            let p10 = frame.luma_at(x0, y1) as f32;
            let p11 = frame.luma_at(x1, y1) as f32;
            let value = p00 * (1.0 - x_frac) * (1.0 - y_frac)
                + p01 * x_frac * (1.0 - y_frac)
                + p10 * (1.0 - x_frac) * y_frac
                + p11 * x_frac * y_frac;
            luma.push(value as u8);
        }
    }

    (luma, dst_width, dst_height, (x_ratio, y_ratio))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downscale_respects_max_dimension() {
        let frame = CameraFrame::from_rgba(1280, 720, vec![200; 1280 * 720 * 4], 0);
        let (luma, w, h, scale) = downscaled_luma(&frame, 640);
        assert_eq!((w, h), (640, 360));
        assert_eq!(luma.len(), 640 * 360);
        assert!((scale.0 - 2.0).abs() < 1e-6);
        assert!((scale.1 - 2.0).abs() < 1e-6);
        assert!(luma.iter().all(|&v| v == 200 || v == 199));
    }

    #[test]
    fn test_small_frames_are_not_scaled() {
        let frame = CameraFrame::from_rgba(4, 2, vec![0; 4 * 2 * 4], 0);
        let (luma, w, h, scale) = downscaled_luma(&frame, 640);
        assert_eq!((w, h, scale), (4, 2, (1.0, 1.0)));
        assert_eq!(luma.len(), 8);
    }

    #[test]
    fn test_truncated_axis_keeps_its_own_scale() {
        // 1000 / 2.5 = 400 exactly, 999 / 2.5 truncates to 399
        let frame = CameraFrame::from_rgba(1000, 999, vec![0; 1000 * 999 * 4], 0);
        let (_, w, h, (x_scale, y_scale)) = downscaled_luma(&frame, 400);
        assert_eq!((w, h), (400, 399));
        assert!((x_scale - 2.5).abs() < 1e-6);
        assert!((y_scale - 999.0 / 399.0).abs() < 1e-6);
    }

    #[test]
    fn test_blank_frame_has_no_codes() {
        let frame = CameraFrame::from_rgba(64, 64, vec![255; 64 * 64 * 4], 0);
        let detections = QrDetector::new().detect(&frame, &[]).unwrap();
        assert!(detections.is_empty());
        assert!(!QrDetector::new().supports_type_filter());
    }
}
