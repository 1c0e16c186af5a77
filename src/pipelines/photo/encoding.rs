// SPDX-License-Identifier: GPL-3.0-only

//! JPEG encoding of captured frames
//!
//! Encoding is CPU-bound and runs on the blocking pool.

use crate::backends::camera::types::CameraFrame;
use crate::constants::quality::MIN_ENCODER_QUALITY;
use crate::errors::{SessionError, SessionResult};
use crate::pipelines::display::CropRect;
use image::RgbImage;
use std::sync::Arc;
use tracing::debug;

/// Map caller quality (0-100) to encoder quality (0.1-1.0)
pub fn encoder_quality(quality: u8) -> f32 {
    (quality as f32 / 100.0).clamp(MIN_ENCODER_QUALITY, 1.0)
}

/// Encoder quality as the 1-100 scale the JPEG codec takes
pub fn jpeg_quality(encoder_quality: f32) -> u8 {
    (encoder_quality.clamp(MIN_ENCODER_QUALITY, 1.0) * 100.0).round() as u8
}

/// Encoded still ready for hand-off
#[derive(Debug, Clone)]
pub struct EncodedPhoto {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Photo encoder for one quality setting
#[derive(Debug, Clone, Copy)]
pub struct PhotoEncoder {
    quality: f32,
}

impl PhotoEncoder {
    /// `quality` is the caller's 0-100 value
    pub fn new(quality: u8) -> Self {
        Self {
            quality: encoder_quality(quality),
        }
    }

    /// Crop and encode a frame on the blocking pool
    pub async fn encode(&self, frame: Arc<CameraFrame>, crop: CropRect) -> SessionResult<EncodedPhoto> {
        let quality = jpeg_quality(self.quality);
        tokio::task::spawn_blocking(move || encode_frame(&frame, crop, quality))
            .await
            .map_err(|e| SessionError::EncodingFailed(format!("encoding task failed: {}", e)))?
    }
}

/// Crop a frame and encode it as JPEG
pub fn encode_frame(frame: &CameraFrame, crop: CropRect, quality: u8) -> SessionResult<EncodedPhoto> {
    let rgb = cropped_rgb(frame, crop)?;
    let data = encode_jpeg(&rgb, quality)?;
    debug!(
        width = rgb.width(),
        height = rgb.height(),
        quality,
        size = data.len(),
        "Encoded photo"
    );
    Ok(EncodedPhoto {
        data,
        width: rgb.width(),
        height: rgb.height(),
    })
}

/// Encode a full frame without cropping
pub fn encode_full_frame(frame: &CameraFrame, quality: u8) -> SessionResult<Vec<u8>> {
    let crop = CropRect {
        x: 0,
        y: 0,
        width: frame.width,
        height: frame.height,
    };
    encode_frame(frame, crop, quality).map(|photo| photo.data)
}

fn cropped_rgb(frame: &CameraFrame, crop: CropRect) -> SessionResult<RgbImage> {
    let rgba = frame.to_rgba_image().ok_or_else(|| {
        SessionError::EncodingFailed(format!(
            "frame buffer does not match {}x{}",
            frame.width, frame.height
        ))
    })?;

    if crop.width == 0 || crop.height == 0 {
        return Err(SessionError::EncodingFailed("empty crop region".into()));
    }

    let view = image::imageops::crop_imm(&rgba, crop.x, crop.y, crop.width, crop.height);
    Ok(image::DynamicImage::ImageRgba8(view.to_image()).to_rgb8())
}

fn encode_jpeg(image: &RgbImage, quality: u8) -> SessionResult<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality);
    encoder
        .encode(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| SessionError::EncodingFailed(format!("JPEG encoding failed: {}", e)))?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_frame(width: u32, height: u32) -> CameraFrame {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[(x * 255 / width) as u8, (y * 255 / height) as u8, 128, 255]);
            }
        }
        CameraFrame::from_rgba(width, height, data, 0)
    }

    #[test]
    fn test_quality_mapping_clamps() {
        assert_eq!(encoder_quality(0), MIN_ENCODER_QUALITY);
        assert_eq!(encoder_quality(5), MIN_ENCODER_QUALITY);
        assert!((encoder_quality(90) - 0.9).abs() < f32::EPSILON);
        assert_eq!(encoder_quality(100), 1.0);
        assert_eq!(encoder_quality(255), 1.0);
        assert_eq!(jpeg_quality(0.9), 90);
    }

    #[test]
    fn test_encode_crops_to_region() {
        let frame = gradient_frame(64, 48);
        let crop = CropRect {
            x: 8,
            y: 0,
            width: 48,
            height: 48,
        };
        let photo = encode_frame(&frame, crop, 90).unwrap();
        assert_eq!((photo.width, photo.height), (48, 48));

        let decoded = image::load_from_memory(&photo.data).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (48, 48));
    }

    #[tokio::test]
    async fn test_async_encode_produces_jpeg() {
        let frame = Arc::new(gradient_frame(32, 32));
        let crop = CropRect {
            x: 0,
            y: 0,
            width: 32,
            height: 32,
        };
        let photo = PhotoEncoder::new(85).encode(frame, crop).await.unwrap();
        // JPEG SOI marker
        assert_eq!(&photo.data[..2], &[0xFF, 0xD8]);
    }
}
