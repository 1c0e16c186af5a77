// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for session start/stop and the host bridge

mod common;

use camera_session::api;
use camera_session::backends::camera::{CameraBackend, CameraPosition, OutputKind};
use camera_session::backends::virtual_camera::VirtualBackend;
use camera_session::config::StartConfig;
use camera_session::errors::{ErrorKind, SessionError};
use camera_session::permissions::{PermissionKind, PermissionState, StaticPermissionGate};
use camera_session::pipelines::photo::CaptureRequest;
use camera_session::pipelines::video::RecordingOptions;
use camera_session::session::SessionState;
use common::{eventually, fixture, fixture_with};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const PHOTO: CaptureRequest = CaptureRequest {
    quality: 90,
    save_to_file: false,
};

#[tokio::test]
async fn test_double_start_acquires_once() {
    let f = fixture(VirtualBackend::new());

    f.session.start(StartConfig::default()).await.unwrap();
    f.session.start(StartConfig::default()).await.unwrap();

    assert!(f.session.is_running());
    assert_eq!(f.backend.acquire_count(), 1);
}

#[tokio::test]
async fn test_stop_on_idle_resolves() {
    let f = fixture(VirtualBackend::new());
    f.session.stop().await.unwrap();
    f.session.stop().await.unwrap();
    assert_eq!(f.backend.release_count(), 0);
}

#[tokio::test]
async fn test_operations_on_idle_session_reject() {
    let f = fixture(VirtualBackend::new());

    let capture = f.session.capture(PHOTO).await.unwrap_err();
    assert_eq!(capture.kind(), ErrorKind::SessionNotRunning);

    let sample = f.session.capture_sample(PHOTO).await.unwrap_err();
    assert_eq!(sample.kind(), ErrorKind::SessionNotRunning);

    let recording = f
        .session
        .start_recording(RecordingOptions {
            enable_audio: false,
            quality: 80,
        })
        .await
        .unwrap_err();
    assert_eq!(recording.kind(), ErrorKind::SessionNotRunning);

    assert_eq!(
        f.session.set_zoom(2.0, false).unwrap_err().kind(),
        ErrorKind::SessionNotRunning
    );
    assert_eq!(
        f.session.stop_recording().await.unwrap_err(),
        SessionError::NoRecordingInProgress
    );
}

#[tokio::test]
async fn test_stop_releases_everything() {
    let f = fixture(VirtualBackend::new());
    f.session
        .start(StartConfig {
            enable_barcode_detection: true,
            ..StartConfig::default()
        })
        .await
        .unwrap();
    assert!(f.backend.attached_outputs().contains(&OutputKind::BarcodeAnalysis));

    f.session.stop().await.unwrap();

    assert_eq!(f.session.snapshot().state, SessionState::Idle);
    assert!(!f.backend.is_acquired());
    assert!(f.backend.attached_outputs().is_empty());
    assert_eq!(f.backend.release_count(), 1);
    assert_eq!(f.session.registry().pending_count(), 0);
}

#[tokio::test]
async fn test_start_selects_requested_position() {
    let f = fixture(VirtualBackend::new());
    f.session
        .start(StartConfig {
            position: Some(CameraPosition::Front),
            ..StartConfig::default()
        })
        .await
        .unwrap();

    let session = f.session.snapshot();
    assert_eq!(session.position, CameraPosition::Front);
    assert_eq!(session.device_id(), Some("virtual-front"));
}

#[tokio::test]
async fn test_unknown_device_is_rejected_before_acquisition() {
    let f = fixture(VirtualBackend::new());
    let err = f
        .session
        .start(StartConfig {
            device_id: Some("missing".into()),
            ..StartConfig::default()
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DeviceNotFound);
    assert_eq!(f.backend.acquire_count(), 0);
    assert!(!f.session.is_running());
}

#[tokio::test]
async fn test_busy_device_fails_start_and_allows_retry() {
    let f = fixture(VirtualBackend::new());
    f.backend.update_faults(|faults| {
        faults.fail_acquire.insert("virtual-back-wide".into());
    });

    let err = f.session.start(StartConfig::default()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::HardwareAcquisitionFailed);
    assert_eq!(f.session.snapshot().state, SessionState::Idle);

    f.backend.update_faults(|faults| faults.fail_acquire.clear());
    f.session.start(StartConfig::default()).await.unwrap();
    assert!(f.session.is_running());
}

#[tokio::test]
async fn test_denied_camera_permission_rejects_start() {
    let gate = Arc::new(StaticPermissionGate::new(
        PermissionState::Denied,
        PermissionState::Denied,
    ));
    let f = fixture_with(VirtualBackend::new(), |b| b.permissions(gate.clone()));

    let err = f.session.start(StartConfig::default()).await.unwrap_err();
    assert_eq!(err, SessionError::PermissionDenied("camera".into()));
    assert_eq!(f.backend.acquire_count(), 0);
    assert_eq!(gate.prompt_count(), 0);
}

#[tokio::test]
async fn test_undetermined_camera_permission_is_requested() {
    let gate = Arc::new(
        StaticPermissionGate::new(PermissionState::Prompt, PermissionState::Prompt)
            .with_prompt_answer(PermissionKind::Camera, PermissionState::Granted),
    );
    let f = fixture_with(VirtualBackend::new(), |b| b.permissions(gate.clone()));

    f.session.start(StartConfig::default()).await.unwrap();
    assert!(f.session.is_running());
    assert_eq!(gate.prompt_count(), 1);
    assert_eq!(f.session.check_permissions().camera, PermissionState::Granted);
}

#[tokio::test]
async fn test_stop_cancels_slow_start() {
    let f = fixture(VirtualBackend::new());
    f.backend.update_faults(|faults| faults.acquire_delay = Some(Duration::from_secs(30)));

    let session = f.session.clone();
    let starting = tokio::spawn(async move { session.start(StartConfig::default()).await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    tokio::time::timeout(Duration::from_secs(2), f.session.stop())
        .await
        .expect("stop must not wait for the hardware")
        .unwrap();
    let err = starting.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SessionStopped);
    assert!(!f.session.is_running());

    f.backend.update_faults(|faults| faults.acquire_delay = None);
    f.session.start(StartConfig::default()).await.unwrap();
    assert!(f.session.is_running());
}

#[tokio::test]
async fn test_disconnect_ends_session() {
    let f = fixture(VirtualBackend::new());
    f.session.start(StartConfig::default()).await.unwrap();

    f.backend.simulate_disconnect();

    assert!(eventually(|| f.session.snapshot().state == SessionState::Idle).await);
    assert!(!f.backend.is_acquired());
    let err = f.session.capture(PHOTO).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SessionNotRunning);
}

#[tokio::test]
async fn test_disconnect_during_bring_up_ends_session() {
    let f = fixture(VirtualBackend::new());
    f.backend
        .update_faults(|faults| faults.disconnect_after_acquire = true);

    f.session.start(StartConfig::default()).await.unwrap();

    assert!(eventually(|| f.session.snapshot().state == SessionState::Idle).await);
    assert!(!f.backend.is_acquired());
    assert_eq!(f.backend.release_count(), 1);
}

#[tokio::test]
async fn test_bridge_round_trip() {
    let f = fixture(VirtualBackend::new());
    let session = &f.session;

    let running = api::invoke(session, "isRunning", json!(null)).await.unwrap();
    assert_eq!(running, json!({ "isRunning": false }));

    let rejected = api::invoke(session, "getZoom", json!(null)).await.unwrap_err();
    assert_eq!(rejected.code, "SESSION_NOT_RUNNING");

    api::invoke(session, "start", json!({ "position": "back", "zoomFactor": 2.0 }))
        .await
        .unwrap();
    let zoom = api::invoke(session, "getZoom", json!(null)).await.unwrap();
    assert_eq!(zoom, json!({ "min": 1.0, "max": 10.0, "current": 2.0 }));

    api::invoke(session, "setFlashMode", json!({ "mode": "torch" }))
        .await
        .unwrap();
    let flash = api::invoke(session, "getFlashMode", json!(null)).await.unwrap();
    assert_eq!(flash, json!({ "flashMode": "torch" }));

    let devices = api::invoke(session, "getAvailableDevices", json!(null)).await.unwrap();
    assert_eq!(devices["devices"].as_array().map(Vec::len), Some(3));
    assert_eq!(devices["devices"][0]["position"], json!("back"));

    let photo = api::invoke(session, "capture", json!({ "quality": 90 })).await.unwrap();
    assert!(photo["photo"].as_str().is_some_and(|p| !p.is_empty()));

    for quality in [json!(300), json!(-5), json!(90.5)] {
        let photo = api::invoke(session, "captureSample", json!({ "quality": quality }))
            .await
            .unwrap();
        assert!(photo["photo"].as_str().is_some_and(|p| !p.is_empty()));
    }

    let unknown = api::invoke(session, "teleport", json!(null)).await.unwrap_err();
    assert_eq!(unknown.code, api::UNIMPLEMENTED);

    api::invoke(session, "stop", json!(null)).await.unwrap();
    let running = api::invoke(session, "isRunning", json!(null)).await.unwrap();
    assert_eq!(running, json!({ "isRunning": false }));
}
