// SPDX-License-Identifier: GPL-3.0-only

//! Session aggregate

use crate::backends::camera::{CameraDevice, CameraPosition, FlashMode};
use crate::pipelines::barcode::BarcodeType;
use crate::pipelines::display::PreviewViewport;

/// Lifecycle state of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Starting,
    Running,
    Stopping,
}

/// Everything the controller knows about the running session
///
/// Written only by the session controller; readers get clones.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Session {
    pub state: SessionState,
    pub device: Option<CameraDevice>,
    pub position: CameraPosition,
    pub zoom_factor: f32,
    pub flash_mode: FlashMode,
    pub barcode_enabled: bool,
    pub barcode_types: Vec<BarcodeType>,
    pub viewport: Option<PreviewViewport>,
    /// Generation the session is running in
    pub generation: u64,
}

impl Session {
    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device.as_ref().map(|d| d.id.as_str())
    }
}
