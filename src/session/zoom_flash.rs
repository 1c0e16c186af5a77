// SPDX-License-Identifier: GPL-3.0-only

//! Zoom and flash control for the active device
//!
//! Requests outside what the device supports are clamped or ignored, never
//! rejected: zoom is clamped into the device range, an unsupported flash mode
//! keeps the current one.

use crate::backends::camera::{CameraBackend, FlashMode};
use crate::errors::SessionResult;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// `{min, max, current}` as reported by `getZoom()`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ZoomState {
    pub min: f32,
    pub max: f32,
    pub current: f32,
}

/// Zoom and flash settings after a device change
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RestoredSettings {
    pub zoom: f32,
    pub flash: FlashMode,
}

pub struct ZoomFlashController {
    backend: Arc<dyn CameraBackend>,
}

impl ZoomFlashController {
    pub fn new(backend: Arc<dyn CameraBackend>) -> Self {
        Self { backend }
    }

    pub fn zoom(&self, current: f32) -> ZoomState {
        let range = self.backend.capabilities().zoom;
        ZoomState {
            min: range.min,
            max: range.max,
            current: range.clamp(current),
        }
    }

    /// Apply a zoom level; returns the factor actually applied
    pub fn set_zoom(&self, level: f32, ramp: bool) -> SessionResult<f32> {
        let range = self.backend.capabilities().zoom;
        let effective = range.clamp(level);
        if effective != level {
            debug!(requested = level, effective, "Zoom clamped to device range");
        }
        self.backend.set_zoom(effective, ramp)?;
        Ok(effective)
    }

    /// Flash modes of the active device (empty without a flash unit)
    pub fn supported_flash_modes(&self) -> Vec<FlashMode> {
        self.backend.capabilities().flash_modes
    }

    /// Apply a flash mode; returns the mode in effect afterwards
    pub fn set_flash_mode(&self, requested: FlashMode, current: FlashMode) -> SessionResult<FlashMode> {
        if !self.supported_flash_modes().contains(&requested) {
            warn!(mode = %requested, "Flash mode not supported by device, ignoring");
            return Ok(current);
        }
        self.backend.set_flash_mode(requested)?;
        info!(mode = %requested, "Flash mode set");
        Ok(requested)
    }

    /// Reapply settings on a freshly acquired device
    ///
    /// Zoom outside the new range is clamped and an unsupported flash mode
    /// falls back to off; both are logged as downgrades.
    pub fn restore(&self, zoom: f32, flash: FlashMode) -> SessionResult<RestoredSettings> {
        let caps = self.backend.capabilities();

        let effective_zoom = caps.zoom.clamp(zoom);
        if effective_zoom != zoom {
            warn!(
                requested = zoom,
                effective = effective_zoom,
                "Zoom not supported by new device, clamped"
            );
        }
        self.backend.set_zoom(effective_zoom, false)?;

        let effective_flash = if caps.flash_modes.contains(&flash) {
            flash
        } else {
            if flash != FlashMode::Off {
                warn!(mode = %flash, "Flash mode not supported by new device, turning off");
            }
            FlashMode::Off
        };
        if caps.flash_modes.contains(&effective_flash) {
            self.backend.set_flash_mode(effective_flash)?;
        }

        Ok(RestoredSettings {
            zoom: effective_zoom,
            flash: effective_flash,
        })
    }
}
