// SPDX-License-Identifier: GPL-3.0-only

//! Mapping between sensor frames and what the preview shows
//!
//! The host renders the preview into a viewport of its own size. With
//! `cover` fit the frame is scaled to fill the viewport and the overflow is
//! cropped; with `contain` the whole frame is visible and letterboxed.
//! Captures are cropped to the visible region, and barcode rectangles are
//! reported in normalised viewport coordinates.

use serde::{Deserialize, Serialize};

/// How the preview is fitted into its viewport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewFit {
    #[default]
    Cover,
    Contain,
}

/// Rendered preview geometry in host pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PreviewViewport {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub fit: PreviewFit,
}

/// Normalized rectangle (0.0 to 1.0 on both axes)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameRegion {
    /// Left edge (0.0 = left, 1.0 = right)
    pub x: f32,
    /// Top edge (0.0 = top, 1.0 = bottom)
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl FrameRegion {
    /// Create a region from pixel coordinates within a frame
    pub fn from_pixels(rect: PixelRect, frame_width: u32, frame_height: u32) -> Self {
        if frame_width == 0 || frame_height == 0 {
            return Self::default();
        }
        let fw = frame_width as f32;
        let fh = frame_height as f32;
        Self::from_edges(
            rect.x / fw,
            rect.y / fh,
            (rect.x + rect.width) / fw,
            (rect.y + rect.height) / fh,
        )
    }

    /// Build from edges, clipping to the unit square
    fn from_edges(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        let clip = |v: f32| if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
        let (x0, x1) = (clip(left.min(right)), clip(left.max(right)));
        let (y0, y1) = (clip(top.min(bottom)), clip(top.max(bottom)));
        Self {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        }
    }

    /// True if every edge lies inside the unit square (within f32 rounding)
    pub fn is_normalized(&self) -> bool {
        let inside = |v: f32| (-f32::EPSILON..=1.0 + f32::EPSILON).contains(&v);
        inside(self.x)
            && inside(self.y)
            && inside(self.x + self.width)
            && inside(self.y + self.height)
    }
}

/// Rectangle in frame pixel coordinates (may extend past the frame)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PixelRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PixelRect {
    /// Axis-aligned bounding box of a set of corner points
    pub fn bounding(points: &[(f32, f32)]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let (mut min_x, mut min_y) = *first;
        let (mut max_x, mut max_y) = *first;
        for &(x, y) in rest {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        Some(Self {
            x: min_x,
            y: min_y,
            width: max_x - min_x,
            height: max_y - min_y,
        })
    }
}

/// Integer crop window inside a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Frame-to-display transform for one frame size
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayTransform {
    frame_width: u32,
    frame_height: u32,
    viewport: Option<PreviewViewport>,
}

impl DisplayTransform {
    /// Degenerate viewports are treated as "no viewport"
    pub fn new(frame_width: u32, frame_height: u32, viewport: Option<PreviewViewport>) -> Self {
        let viewport = viewport.filter(|v| v.width > 0 && v.height > 0);
        Self {
            frame_width,
            frame_height,
            viewport,
        }
    }

    /// Region of the frame the preview actually shows
    pub fn crop_rect(&self) -> CropRect {
        let full = CropRect {
            x: 0,
            y: 0,
            width: self.frame_width,
            height: self.frame_height,
        };

        let Some(view) = self.viewport else {
            return full;
        };
        if view.fit == PreviewFit::Contain || self.frame_width == 0 || self.frame_height == 0 {
            return full;
        }

        let fw = self.frame_width as f64;
        let fh = self.frame_height as f64;
        let view_aspect = view.width as f64 / view.height as f64;

        if fw / fh > view_aspect {
            // Frame is wider: crop left and right
            let visible = ((fh * view_aspect).round() as u32).clamp(1, self.frame_width);
            CropRect {
                x: (self.frame_width - visible) / 2,
                y: 0,
                width: visible,
                height: self.frame_height,
            }
        } else {
            // Frame is taller: crop top and bottom
            let visible = ((fw / view_aspect).round() as u32).clamp(1, self.frame_height);
            CropRect {
                x: 0,
                y: (self.frame_height - visible) / 2,
                width: self.frame_width,
                height: visible,
            }
        }
    }

    /// Map a frame-pixel rectangle to normalised display coordinates
    pub fn to_display(&self, rect: PixelRect) -> FrameRegion {
        if self.frame_width == 0 || self.frame_height == 0 {
            return FrameRegion::default();
        }

        match self.viewport {
            Some(view) if view.fit == PreviewFit::Contain => {
                let fw = self.frame_width as f32;
                let fh = self.frame_height as f32;
                let vw = view.width as f32;
                let vh = view.height as f32;
                let scale = (vw / fw).min(vh / fh);
                let offset_x = (vw - fw * scale) / 2.0;
                let offset_y = (vh - fh * scale) / 2.0;
                FrameRegion::from_edges(
                    (offset_x + rect.x * scale) / vw,
                    (offset_y + rect.y * scale) / vh,
                    (offset_x + (rect.x + rect.width) * scale) / vw,
                    (offset_y + (rect.y + rect.height) * scale) / vh,
                )
            }
            _ => {
                let crop = self.crop_rect();
                let shifted = PixelRect {
                    x: rect.x - crop.x as f32,
                    y: rect.y - crop.y as f32,
                    ..rect
                };
                FrameRegion::from_pixels(shifted, crop.width, crop.height)
            }
        }
    }
}
