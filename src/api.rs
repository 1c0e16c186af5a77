// SPDX-License-Identifier: GPL-3.0-only

//! Host bridge
//!
//! Request and response shapes of the public operations as serde types with
//! camelCase field names, and [`invoke`] to dispatch a method name with JSON
//! arguments onto a [`SessionController`]. Inline photos travel as base64.

use crate::backends::camera::{CameraDevice, CameraPosition, FlashMode};
use crate::config::StartConfig;
use crate::errors::{Rejection, SessionError};
use crate::permissions::{PermissionKind, PermissionStatus};
use crate::pipelines::barcode::BarcodeEvent;
use crate::pipelines::photo::{CaptureOutput, CaptureRequest};
use crate::pipelines::video::{FinishedRecording, RecordingOptions};
use crate::session::{SessionController, ZoomState};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Name of the event carrying [`BarcodeEvent`] payloads
pub const BARCODE_DETECTED_EVENT: &str = "barcodeDetected";

/// Code for arguments that do not match the method's shape
pub const INVALID_ARGUMENT: &str = "INVALID_ARGUMENT";

/// Code for unknown method names
pub const UNIMPLEMENTED: &str = "UNIMPLEMENTED";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureOptions {
    /// 0-100, clamped; the configured default when absent
    pub quality: Option<f64>,
    pub save_to_file: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_path: Option<String>,
}

impl From<CaptureOutput> for CaptureResult {
    fn from(output: CaptureOutput) -> Self {
        match output {
            CaptureOutput::Inline(bytes) => CaptureResult {
                photo: Some(STANDARD.encode(bytes)),
                web_path: None,
            },
            CaptureOutput::File { web_path, .. } => CaptureResult {
                photo: None,
                web_path: Some(web_path),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoomOptions {
    pub level: f32,
    #[serde(default)]
    pub ramp: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlashModeOptions {
    pub mode: FlashMode,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StartRecordingOptions {
    pub enable_audio: bool,
    pub quality: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopRecordingResult {
    pub web_path: String,
}

impl From<FinishedRecording> for StopRecordingResult {
    fn from(recording: FinishedRecording) -> Self {
        Self {
            web_path: recording.web_path,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IsRunningResult {
    pub is_running: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub position: CameraPosition,
}

impl From<CameraDevice> for DeviceInfo {
    fn from(device: CameraDevice) -> Self {
        Self {
            id: device.id,
            name: device.name,
            position: device.position,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceList {
    pub devices: Vec<DeviceInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashModeResult {
    pub flash_mode: FlashMode,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashModesResult {
    pub flash_modes: Vec<FlashMode>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PermissionRequest {
    pub permissions: Option<Vec<PermissionKind>>,
}

/// Run one bridge call
///
/// `args` may be `null` for methods whose options are all optional. Void
/// operations resolve with an empty object.
pub async fn invoke(controller: &SessionController, method: &str, args: Value) -> Result<Value, Rejection> {
    debug!(method, "Bridge call");
    let default_quality = controller.settings().default_quality;

    match method {
        "start" => {
            let config: StartConfig = parse(args)?;
            controller.start(config).await.map_err(reject)?;
            empty()
        }
        "stop" => {
            controller.stop().await.map_err(reject)?;
            empty()
        }
        "isRunning" => respond(IsRunningResult {
            is_running: controller.is_running(),
        }),
        "capture" | "captureSample" => {
            let options: CaptureOptions = parse(args)?;
            let request = CaptureRequest {
                quality: clamp_quality(options.quality, default_quality),
                save_to_file: options.save_to_file,
            };
            let output = if method == "capture" {
                controller.capture(request).await
            } else {
                controller.capture_sample(request).await
            };
            respond(CaptureResult::from(output.map_err(reject)?))
        }
        "flipCamera" => {
            controller.flip_camera().await.map_err(reject)?;
            empty()
        }
        "getAvailableDevices" => respond(DeviceList {
            devices: controller
                .get_available_devices()
                .into_iter()
                .map(DeviceInfo::from)
                .collect(),
        }),
        "getZoom" => respond::<ZoomState>(controller.get_zoom().map_err(reject)?),
        "setZoom" => {
            let options: ZoomOptions = parse_required(args)?;
            controller.set_zoom(options.level, options.ramp).map_err(reject)?;
            empty()
        }
        "getFlashMode" => respond(FlashModeResult {
            flash_mode: controller.get_flash_mode().map_err(reject)?,
        }),
        "getSupportedFlashModes" => respond(FlashModesResult {
            flash_modes: controller.get_supported_flash_modes().map_err(reject)?,
        }),
        "setFlashMode" => {
            let options: FlashModeOptions = parse_required(args)?;
            controller.set_flash_mode(options.mode).map_err(reject)?;
            empty()
        }
        "checkPermissions" => respond::<PermissionStatus>(controller.check_permissions()),
        "requestPermissions" => {
            let request: PermissionRequest = parse(args)?;
            respond(controller.request_permissions(request.permissions).await)
        }
        "startRecording" => {
            let options: StartRecordingOptions = parse(args)?;
            controller
                .start_recording(RecordingOptions {
                    enable_audio: options.enable_audio,
                    quality: clamp_quality(options.quality, default_quality),
                })
                .await
                .map_err(reject)?;
            empty()
        }
        "stopRecording" => {
            let finished = controller.stop_recording().await.map_err(reject)?;
            respond(StopRecordingResult::from(finished))
        }
        other => Err(Rejection {
            code: UNIMPLEMENTED,
            message: format!("unknown method '{}'", other),
        }),
    }
}

/// `barcodeDetected` payload for an event bus
pub fn barcode_event_payload(event: &BarcodeEvent) -> Value {
    serde_json::to_value(event).unwrap_or(Value::Null)
}

/// Map a caller-supplied quality onto the 0-100 scale
fn clamp_quality(quality: Option<f64>, default: u8) -> u8 {
    match quality {
        Some(q) if q.is_finite() => q.round().clamp(0.0, 100.0) as u8,
        _ => default,
    }
}

fn parse<T: DeserializeOwned + Default>(args: Value) -> Result<T, Rejection> {
    if args.is_null() {
        return Ok(T::default());
    }
    parse_required(args)
}

fn parse_required<T: DeserializeOwned>(args: Value) -> Result<T, Rejection> {
    serde_json::from_value(args).map_err(|e| Rejection {
        code: INVALID_ARGUMENT,
        message: e.to_string(),
    })
}

fn respond<T: Serialize>(value: T) -> Result<Value, Rejection> {
    serde_json::to_value(value).map_err(|e| Rejection {
        code: INVALID_ARGUMENT,
        message: e.to_string(),
    })
}

fn empty() -> Result<Value, Rejection> {
    Ok(Value::Object(serde_json::Map::new()))
}

fn reject(err: SessionError) -> Rejection {
    err.to_rejection()
}
