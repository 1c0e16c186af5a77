// SPDX-License-Identifier: GPL-3.0-only

//! Camera backend abstraction
//!
//! Each host platform owns a real capture pipeline underneath; the session
//! layer only ever talks to it through the [`CameraBackend`] trait.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  SessionController  │  ← Lifecycle, serialisation, teardown
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │  CameraBackend Trait│  ← Common interface
//! └──────────┬──────────┘
//!            │
//!            ▼
//!  ┌──────────────────┐
//!  │ Native / Virtual │  ← Concrete implementations
//!  └──────────────────┘
//! ```

pub mod catalog;
pub mod types;

pub use catalog::{DeviceCatalog, DeviceSelection};
pub use types::*;

use futures::future::BoxFuture;
use tokio::sync::broadcast;

/// Complete camera backend trait
///
/// Asynchronous operations return boxed futures that resolve exactly once,
/// when the hardware confirms the operation (not when it was merely
/// requested). Futures must tolerate being dropped before completion: the
/// session cancels them when it is stopped.
pub trait CameraBackend: Send + Sync {
    // ===== Enumeration =====

    /// Enumerate available cameras
    fn enumerate_cameras(&self) -> Vec<CameraDevice>;

    /// Output conflict rules of this platform's capture pipeline
    fn compatibility(&self) -> CompatibilityTable;

    // ===== Lifecycle =====

    /// Open the device and start its frame stream
    fn acquire<'a>(&'a self, device: &'a CameraDevice) -> BoxFuture<'a, BackendResult<()>>;

    /// Stop the stream and release the device
    ///
    /// Must succeed (or fail harmlessly) when nothing is acquired.
    fn release(&self) -> BoxFuture<'_, BackendResult<()>>;

    /// Check if a device is currently acquired
    fn is_acquired(&self) -> bool;

    // ===== Outputs =====

    /// Add an output consumer to the capture pipeline
    fn attach_output(&self, kind: OutputKind) -> BackendResult<()>;

    /// Remove an output consumer from the capture pipeline
    fn detach_output(&self, kind: OutputKind) -> BackendResult<()>;

    /// Add a microphone input for recording
    fn attach_audio_input(&self) -> BackendResult<()>;

    /// Remove the microphone input
    fn detach_audio_input(&self) -> BackendResult<()>;

    // ===== Device parameters =====

    /// Capabilities of the active device (defaults when none is active)
    fn capabilities(&self) -> DeviceCapabilities;

    /// Apply a zoom factor already clamped into the supported range
    fn set_zoom(&self, factor: f32, ramp: bool) -> BackendResult<()>;

    /// Apply a flash mode the device reported as supported
    fn set_flash_mode(&self, mode: FlashMode) -> BackendResult<()>;

    // ===== Capture =====

    /// Drive a full hardware still-capture cycle
    fn capture_still(&self) -> BoxFuture<'_, BackendResult<CameraFrame>>;

    /// Latest frame of the live stream, without a still-capture cycle
    fn sample_frame(&self) -> BackendResult<CameraFrame>;

    /// Subscribe to live frames at the natural delivery rate
    ///
    /// Returns `None` when no stream is active.
    fn frames(&self) -> Option<FrameReceiver>;

    // ===== Recording =====

    /// File extension of the container written by the recorder
    fn recording_extension(&self) -> &'static str;

    /// Start recording; resolves once the first frame has been written
    fn start_recording(&self, request: RecordingRequest) -> BoxFuture<'_, BackendResult<()>>;

    /// Stop recording; resolves once the file is flushed and closed
    fn stop_recording(&self) -> BoxFuture<'_, BackendResult<()>>;

    // ===== Events =====

    /// Subscribe to asynchronous backend events
    fn events(&self) -> broadcast::Receiver<BackendEvent>;

    /// Get the backend type identifier
    fn backend_type(&self) -> &'static str;
}
