// SPDX-License-Identifier: GPL-3.0-only

//! Crate-wide constants

use std::time::Duration;

/// Application directory name used under config/temp/pictures dirs
pub const APP_DIR: &str = "camera-session";

/// Version string including git revision (set by build.rs)
pub fn app_version() -> &'static str {
    env!("GIT_VERSION")
}

/// Timeouts and intervals
pub mod timing {
    use super::Duration;

    /// Minimum interval between two analysed barcode frames
    pub const BARCODE_SCAN_INTERVAL: Duration = Duration::from_millis(100);

    /// Upper bound for each hardware call during teardown
    pub const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(3);

    /// How long attaching the recorder waits for in-flight photo captures
    pub const CAPTURE_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

    /// How long a recording start may take before it is treated as failed
    pub const RECORDING_CONFIRM_TIMEOUT: Duration = Duration::from_secs(5);

    /// Grace period for the barcode task to exit after cancellation
    pub const TASK_JOIN_TIMEOUT: Duration = Duration::from_millis(500);
}

/// Photo quality mapping
pub mod quality {
    /// Lowest encoder quality ever used (0.0-1.0 scale)
    pub const MIN_ENCODER_QUALITY: f32 = 0.1;

    /// Quality used when the caller does not supply one (0-100 scale)
    pub const DEFAULT_QUALITY: u8 = 85;
}

/// Barcode analysis
pub mod barcode {
    /// Frames are downscaled to this maximum dimension before detection
    pub const MAX_DIMENSION: u32 = 640;

    /// Capacity of the barcode event broadcast channel
    pub const EVENT_CHANNEL_CAPACITY: usize = 32;
}

/// Temp artifact naming
pub mod files {
    pub const PHOTO_PREFIX: &str = "photo";
    pub const VIDEO_PREFIX: &str = "video";
    pub const PHOTO_EXTENSION: &str = "jpg";

    /// Image formats the virtual camera can load as a still source
    pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];

    /// Check if extension is a supported image format
    pub fn is_image_extension(ext: &str) -> bool {
        IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
    }
}

/// Simulated backend defaults
pub mod virtual_camera {
    use super::Duration;

    pub const FRAME_WIDTH: u32 = 320;
    pub const FRAME_HEIGHT: u32 = 240;
    pub const FRAME_INTERVAL: Duration = Duration::from_millis(33);

    /// Simulated shutter latency of a still capture
    pub const SHUTTER_LATENCY: Duration = Duration::from_millis(5);

    /// Live frames buffered per subscriber before older ones are dropped
    pub const FRAME_CHANNEL_CAPACITY: usize = 4;
}
