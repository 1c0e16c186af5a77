// SPDX-License-Identifier: GPL-3.0-only
// Shared types for camera backend abstraction

//! Shared types for camera backends

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Which side of the device a camera faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CameraPosition {
    /// User-facing camera
    Front,
    /// World-facing camera
    #[default]
    Back,
}

impl CameraPosition {
    /// The position a flip moves to
    pub fn opposite(self) -> Self {
        match self {
            CameraPosition::Front => CameraPosition::Back,
            CameraPosition::Back => CameraPosition::Front,
        }
    }
}

impl std::fmt::Display for CameraPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraPosition::Front => write!(f, "front"),
            CameraPosition::Back => write!(f, "back"),
        }
    }
}

impl std::str::FromStr for CameraPosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "front" | "user" => Ok(CameraPosition::Front),
            "back" | "rear" | "environment" => Ok(CameraPosition::Back),
            other => Err(format!("unknown camera position '{}'", other)),
        }
    }
}

/// Physical lens/module kind, used only as a device-selection hint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum DeviceType {
    #[default]
    WideAngle,
    UltraWide,
    Telephoto,
    Dual,
    DualWide,
    Triple,
    TrueDepth,
    External,
}

/// Supported zoom range of a device
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomRange {
    pub min: f32,
    pub max: f32,
}

impl ZoomRange {
    pub fn new(min: f32, max: f32) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    /// Clamp a requested zoom factor into this range (NaN maps to `min`)
    pub fn clamp(&self, factor: f32) -> f32 {
        if factor.is_nan() {
            return self.min;
        }
        factor.clamp(self.min, self.max)
    }

    pub fn contains(&self, factor: f32) -> bool {
        factor >= self.min && factor <= self.max
    }
}

impl Default for ZoomRange {
    fn default() -> Self {
        Self { min: 1.0, max: 1.0 }
    }
}

/// Flash operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashMode {
    /// Flash LED is off
    #[default]
    Off,
    /// Flash fires during photo capture
    On,
    /// Hardware decides per capture
    Auto,
    /// Torch / flashlight mode (LED stays on continuously)
    Torch,
}

impl std::fmt::Display for FlashMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlashMode::Off => write!(f, "off"),
            FlashMode::On => write!(f, "on"),
            FlashMode::Auto => write!(f, "auto"),
            FlashMode::Torch => write!(f, "torch"),
        }
    }
}

/// Capabilities probed from the active device
///
/// Absent capabilities are expressed as defaults (single-point zoom range,
/// empty flash list) rather than errors.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeviceCapabilities {
    pub zoom: ZoomRange,
    pub flash_modes: Vec<FlashMode>,
    /// True if the backend can hand out the latest live frame without a
    /// dedicated still-capture cycle
    pub fast_sample: bool,
}

/// Represents a camera device
#[derive(Debug, Clone, PartialEq)]
pub struct CameraDevice {
    pub id: String,
    pub name: String,
    pub position: CameraPosition,
    pub device_type: DeviceType,
    pub capabilities: DeviceCapabilities,
}

/// Pixel layout of a frame buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 32-bit RGBA, 4 bytes per pixel
    Rgba,
    /// 32-bit BGRA, 4 bytes per pixel
    Bgra,
    /// 8-bit luma only
    Gray8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgba | PixelFormat::Bgra => 4,
            PixelFormat::Gray8 => 1,
        }
    }
}

/// A single frame from the camera
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    pub data: Arc<[u8]>,
    pub format: PixelFormat,
    /// Row stride in bytes (may include padding)
    pub stride: u32,
    /// Monotonic frame counter assigned by the backend
    pub sequence: u64,
    pub captured_at: Instant,
}

impl CameraFrame {
    /// Build a tightly packed RGBA frame
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>, sequence: u64) -> Self {
        Self {
            width,
            height,
            data: Arc::from(data.into_boxed_slice()),
            format: PixelFormat::Rgba,
            stride: width * 4,
            sequence,
            captured_at: Instant::now(),
        }
    }

    /// RGBA value of one pixel, `None` when out of bounds
    pub fn rgba_at(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let bpp = self.format.bytes_per_pixel();
        let offset = y as usize * self.stride as usize + x as usize * bpp;
        let px = self.data.get(offset..offset + bpp)?;
        Some(match self.format {
            PixelFormat::Rgba => [px[0], px[1], px[2], px[3]],
            PixelFormat::Bgra => [px[2], px[1], px[0], px[3]],
            PixelFormat::Gray8 => [px[0], px[0], px[0], 255],
        })
    }

    /// BT.601 luma of one pixel
    pub fn luma_at(&self, x: u32, y: u32) -> u8 {
        match self.rgba_at(x, y) {
            Some([r, g, b, _]) => {
                ((r as u32 * 299 + g as u32 * 587 + b as u32 * 114) / 1000) as u8
            }
            None => 0,
        }
    }

    /// Copy into a packed `image::RgbaImage`, dropping stride padding
    pub fn to_rgba_image(&self) -> Option<image::RgbaImage> {
        let mut packed = Vec::with_capacity(self.width as usize * self.height as usize * 4);
        for y in 0..self.height {
            for x in 0..self.width {
                packed.extend_from_slice(&self.rgba_at(x, y)?);
            }
        }
        image::RgbaImage::from_raw(self.width, self.height, packed)
    }
}

/// Frame receiver type for live streams
pub type FrameReceiver = tokio::sync::broadcast::Receiver<Arc<CameraFrame>>;

/// Kind of consumer attached to the live capture pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutputKind {
    Preview,
    Photo,
    BarcodeAnalysis,
    Recording,
}

impl std::fmt::Display for OutputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputKind::Preview => write!(f, "preview"),
            OutputKind::Photo => write!(f, "photo"),
            OutputKind::BarcodeAnalysis => write!(f, "barcode analysis"),
            OutputKind::Recording => write!(f, "recording"),
        }
    }
}

/// Whether two outputs may be in flight at the same time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coexistence {
    /// Both may run simultaneously
    Concurrent,
    /// Both may be attached, but only one may be in flight
    Exclusive,
}

/// Declarative per-backend output compatibility table
///
/// Pairs without an explicit rule are concurrent. Preview and barcode
/// analysis never conflict with anything, whatever the rules say.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompatibilityTable {
    rules: Vec<(OutputKind, OutputKind, Coexistence)>,
}

impl CompatibilityTable {
    /// Every output may run alongside every other
    pub fn permissive() -> Self {
        Self::default()
    }

    /// Photo capture and recording cannot be in flight together
    pub fn photo_recording_exclusive() -> Self {
        Self::default().with_rule(OutputKind::Photo, OutputKind::Recording, Coexistence::Exclusive)
    }

    pub fn with_rule(mut self, a: OutputKind, b: OutputKind, rule: Coexistence) -> Self {
        self.rules
            .retain(|(x, y, _)| !((*x == a && *y == b) || (*x == b && *y == a)));
        self.rules.push((a, b, rule));
        self
    }

    pub fn coexistence(&self, a: OutputKind, b: OutputKind) -> Coexistence {
        let never_conflicts = |kind| matches!(kind, OutputKind::Preview | OutputKind::BarcodeAnalysis);
        if never_conflicts(a) || never_conflicts(b) {
            return Coexistence::Concurrent;
        }
        self.rules
            .iter()
            .find(|(x, y, _)| (*x == a && *y == b) || (*x == b && *y == a))
            .map(|(_, _, rule)| *rule)
            .unwrap_or(Coexistence::Concurrent)
    }

    pub fn is_exclusive(&self, a: OutputKind, b: OutputKind) -> bool {
        self.coexistence(a, b) == Coexistence::Exclusive
    }
}

/// Parameters for a hardware recording start
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingRequest {
    pub path: PathBuf,
    pub audio: bool,
    /// Encoder quality in 0.1..=1.0
    pub quality: f32,
}

/// Asynchronous notifications raised by a backend
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// The active device went away; the session must be torn down
    Disconnected { device_id: String },
    /// Non-fatal runtime error worth logging
    Error { message: String },
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Error types for backend operations
#[derive(Debug, Clone, PartialEq)]
pub enum BackendError {
    /// Backend is not available on this system or has no active stream
    NotAvailable(String),
    /// Camera device not found
    DeviceNotFound(String),
    /// Device exists but cannot be opened right now
    DeviceBusy(String),
    /// The pipeline cannot add the requested output
    OutputUnsupported(String),
    /// No recording in progress
    NoRecordingInProgress,
    /// Recorder failed while starting or finalizing
    RecordingFailed(String),
    /// Still/frame encoding failed
    EncodingFailed(String),
    /// General I/O error
    IoError(String),
    /// Other errors
    Other(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::NotAvailable(msg) => write!(f, "Backend not available: {}", msg),
            BackendError::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            BackendError::DeviceBusy(msg) => write!(f, "Device busy: {}", msg),
            BackendError::OutputUnsupported(msg) => write!(f, "Output unsupported: {}", msg),
            BackendError::NoRecordingInProgress => write!(f, "No recording in progress"),
            BackendError::RecordingFailed(msg) => write!(f, "Recording failed: {}", msg),
            BackendError::EncodingFailed(msg) => write!(f, "Encoding failed: {}", msg),
            BackendError::IoError(msg) => write!(f, "I/O error: {}", msg),
            BackendError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::IoError(err.to_string())
    }
}
