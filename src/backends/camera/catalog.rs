// SPDX-License-Identifier: GPL-3.0-only

//! Device enumeration and selection

use super::CameraBackend;
use super::types::{CameraDevice, CameraPosition, DeviceType};
use crate::errors::{SessionError, SessionResult};
use std::sync::Arc;
use tracing::{debug, info};

/// How `start()` picks a device
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceSelection {
    /// Exact device id, takes precedence over everything else
    pub device_id: Option<String>,
    pub position: CameraPosition,
    /// Preferred module kinds in priority order (best effort)
    pub preferred_types: Vec<DeviceType>,
    /// Prefer a triple-camera module when one exists (best effort)
    pub prefer_triple: bool,
}

/// Stateless view over the backend's device list
#[derive(Clone)]
pub struct DeviceCatalog {
    backend: Arc<dyn CameraBackend>,
}

impl DeviceCatalog {
    pub fn new(backend: Arc<dyn CameraBackend>) -> Self {
        Self { backend }
    }

    /// Enumerate available devices
    pub fn list(&self) -> Vec<CameraDevice> {
        self.backend.enumerate_cameras()
    }

    /// Resolve a selection to a concrete device
    pub fn resolve(&self, selection: &DeviceSelection) -> SessionResult<CameraDevice> {
        let devices = self.list();

        if let Some(id) = selection.device_id.as_deref() {
            return devices
                .into_iter()
                .find(|d| d.id == id)
                .ok_or_else(|| SessionError::DeviceNotFound(format!("no camera with id '{}'", id)));
        }

        let candidates: Vec<CameraDevice> = devices
            .into_iter()
            .filter(|d| d.position == selection.position)
            .collect();

        let preferred = selection.preferred_types.iter().find_map(|wanted| {
            candidates.iter().find(|d| d.device_type == *wanted)
        });

        let chosen = preferred
            .or_else(|| {
                selection
                    .prefer_triple
                    .then(|| candidates.iter().find(|d| d.device_type == DeviceType::Triple))
                    .flatten()
            })
            .or_else(|| candidates.first())
            .cloned();

        match chosen {
            Some(device) => {
                info!(device = %device.id, position = %device.position, "Resolved camera device");
                Ok(device)
            }
            None => Err(SessionError::DeviceNotFound(format!(
                "no {} camera available",
                selection.position
            ))),
        }
    }

    /// First device facing the other way
    pub fn opposite_of(&self, device: &CameraDevice) -> SessionResult<CameraDevice> {
        let target = device.position.opposite();
        debug!(from = %device.id, %target, "Looking up flip target");
        self.resolve(&DeviceSelection {
            position: target,
            ..DeviceSelection::default()
        })
    }
}
