// SPDX-License-Identifier: GPL-3.0-only

use crate::backends::camera::{CameraPosition, DeviceSelection, DeviceType};
use crate::constants::{self, barcode, quality, timing};
use crate::pipelines::barcode::BarcodeType;
use crate::pipelines::display::PreviewViewport;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Persistent tuning knobs for the session core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory for photo/video temp files (defaults to the system temp dir)
    pub temp_dir: Option<PathBuf>,
    /// Minimum interval between analysed barcode frames
    pub barcode_interval_ms: u64,
    /// Upper bound for each hardware call during teardown
    pub teardown_timeout_ms: u64,
    /// How long attaching the recorder waits for in-flight photos
    pub capture_drain_timeout_ms: u64,
    /// How long the recorder may take to confirm its first frame
    pub recording_confirm_timeout_ms: u64,
    /// Photo quality used when a caller omits it (0-100)
    pub default_quality: u8,
    /// Frames are downscaled to this size before barcode detection
    pub barcode_max_dimension: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            temp_dir: None,
            barcode_interval_ms: timing::BARCODE_SCAN_INTERVAL.as_millis() as u64,
            teardown_timeout_ms: timing::TEARDOWN_TIMEOUT.as_millis() as u64,
            capture_drain_timeout_ms: timing::CAPTURE_DRAIN_TIMEOUT.as_millis() as u64,
            recording_confirm_timeout_ms: timing::RECORDING_CONFIRM_TIMEOUT.as_millis() as u64,
            default_quality: quality::DEFAULT_QUALITY,
            barcode_max_dimension: barcode::MAX_DIMENSION,
        }
    }
}

impl Settings {
    /// `$XDG_CONFIG_HOME/camera-session/settings.json`
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(constants::APP_DIR).join("settings.json"))
    }

    /// Load from the default location, falling back to defaults
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => {
                debug!("No config directory available, using default settings");
                Self::default()
            }
        }
    }

    /// Load from a specific file
    ///
    /// A missing file yields defaults silently; an unreadable or malformed
    /// one yields defaults with a warning.
    pub fn load_from(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Settings file not found, using defaults");
                return Self::default();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read settings, using defaults");
                return Self::default();
            }
        };

        match serde_json::from_str(&contents) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Malformed settings, using defaults");
                Self::default()
            }
        }
    }

    /// Write to a specific file, creating parent directories
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(constants::APP_DIR))
    }

    pub fn barcode_interval(&self) -> Duration {
        Duration::from_millis(self.barcode_interval_ms)
    }

    pub fn teardown_timeout(&self) -> Duration {
        Duration::from_millis(self.teardown_timeout_ms)
    }

    pub fn capture_drain_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_drain_timeout_ms)
    }

    pub fn recording_confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.recording_confirm_timeout_ms)
    }
}

/// Options accepted by `start()`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StartConfig {
    /// Exact device id, overrides `position`
    pub device_id: Option<String>,
    /// Defaults to the back camera
    pub position: Option<CameraPosition>,
    pub enable_barcode_detection: bool,
    /// Restrict barcode results to these types (empty means all)
    pub barcode_types: Vec<BarcodeType>,
    /// Initial zoom factor, clamped into the device range
    pub zoom_factor: Option<f32>,
    pub use_triple_camera_if_available: bool,
    pub preferred_camera_device_types: Vec<DeviceType>,
    /// Accepted for compatibility; the host renders the preview
    pub container_element_id: Option<String>,
    /// Rendered preview geometry for crop and overlay mapping
    pub preview: Option<PreviewViewport>,
}

impl StartConfig {
    pub fn selection(&self) -> DeviceSelection {
        DeviceSelection {
            device_id: self.device_id.clone(),
            position: self.position.unwrap_or_default(),
            preferred_types: self.preferred_camera_device_types.clone(),
            prefer_triple: self.use_triple_camera_if_available,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_config_from_bridge_json() {
        let json = r#"{
            "position": "front",
            "enableBarcodeDetection": true,
            "barcodeTypes": ["QR_CODE"],
            "zoomFactor": 2.0,
            "containerElementId": "preview"
        }"#;
        let config: StartConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.position, Some(CameraPosition::Front));
        assert!(config.enable_barcode_detection);
        assert_eq!(config.barcode_types, vec![BarcodeType::QrCode]);
        assert_eq!(config.zoom_factor, Some(2.0));

        let selection = config.selection();
        assert_eq!(selection.position, CameraPosition::Front);
        assert!(selection.device_id.is_none());
    }

    #[test]
    fn test_partial_settings_fill_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"barcode_interval_ms": 250}"#).unwrap();
        assert_eq!(settings.barcode_interval(), Duration::from_millis(250));
        assert_eq!(settings.teardown_timeout(), timing::TEARDOWN_TIMEOUT);
        assert_eq!(settings.default_quality, quality::DEFAULT_QUALITY);
    }
}
