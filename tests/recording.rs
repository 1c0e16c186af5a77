// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for video recording

mod common;

use camera_session::backends::camera::OutputKind;
use camera_session::backends::virtual_camera::VirtualBackend;
use camera_session::config::StartConfig;
use camera_session::errors::{ErrorKind, SessionError};
use camera_session::permissions::{PermissionState, StaticPermissionGate};
use camera_session::pipelines::video::{RecordingOptions, RecordingPhase};
use common::{fixture, fixture_with, temp_files};
use std::sync::Arc;
use std::time::Duration;

const SILENT: RecordingOptions = RecordingOptions {
    enable_audio: false,
    quality: 70,
};

#[tokio::test]
async fn test_record_produces_file() {
    let f = fixture(VirtualBackend::new());
    f.session.start(StartConfig::default()).await.unwrap();

    f.session.start_recording(SILENT).await.unwrap();
    assert_eq!(f.session.recording_phase(), RecordingPhase::Active);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let finished = f.session.stop_recording().await.unwrap();
    assert!(std::fs::metadata(&finished.path).unwrap().len() > 0);
    assert!(finished.web_path.starts_with("file://"));
    assert!(!f.session.registry().is_pending(&finished.path));
    assert_eq!(f.session.registry().pending_count(), 0);
    assert_eq!(f.session.recording_phase(), RecordingPhase::Idle);
    assert!(!f.backend.attached_outputs().contains(&OutputKind::Recording));
}

#[tokio::test]
async fn test_second_start_is_rejected() {
    let f = fixture(VirtualBackend::new());
    f.session.start(StartConfig::default()).await.unwrap();

    f.session.start_recording(SILENT).await.unwrap();
    let err = f.session.start_recording(SILENT).await.unwrap_err();
    assert_eq!(err, SessionError::AlreadyRecording);
    assert_eq!(f.session.recording_phase(), RecordingPhase::Active);
}

#[tokio::test]
async fn test_stop_without_recording_is_rejected() {
    let f = fixture(VirtualBackend::new());
    f.session.start(StartConfig::default()).await.unwrap();

    let err = f.session.stop_recording().await.unwrap_err();
    assert_eq!(err, SessionError::NoRecordingInProgress);
}

#[tokio::test]
async fn test_audio_requires_microphone_permission() {
    let gate = Arc::new(StaticPermissionGate::new(
        PermissionState::Granted,
        PermissionState::Denied,
    ));
    let f = fixture_with(VirtualBackend::new(), |b| b.permissions(gate.clone()));
    f.session.start(StartConfig::default()).await.unwrap();

    let err = f
        .session
        .start_recording(RecordingOptions {
            enable_audio: true,
            quality: 70,
        })
        .await
        .unwrap_err();
    assert_eq!(err, SessionError::PermissionDenied("microphone".into()));
    assert_eq!(f.session.recording_phase(), RecordingPhase::Idle);
    assert!(!f.backend.attached_outputs().contains(&OutputKind::Recording));

    // Silent recording does not need the microphone
    f.session.start_recording(SILENT).await.unwrap();
}

#[tokio::test]
async fn test_audio_input_follows_recording() {
    let f = fixture(VirtualBackend::new());
    f.session.start(StartConfig::default()).await.unwrap();

    f.session
        .start_recording(RecordingOptions {
            enable_audio: true,
            quality: 70,
        })
        .await
        .unwrap();
    assert!(f.backend.audio_input_attached());
    assert_eq!(f.backend.audio_attach_count(), 1);

    f.session.stop_recording().await.unwrap();
    assert!(!f.backend.audio_input_attached());
}

#[tokio::test]
async fn test_unconfirmed_start_times_out() {
    let f = fixture(VirtualBackend::new());
    f.backend.update_faults(|faults| faults.stall_recording_start = true);
    f.session.start(StartConfig::default()).await.unwrap();

    let err = tokio::time::timeout(Duration::from_secs(10), f.session.start_recording(SILENT))
        .await
        .expect("start must be bounded")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::HardwareAcquisitionFailed);
    assert_eq!(f.session.recording_phase(), RecordingPhase::Idle);
    assert_eq!(f.session.registry().pending_count(), 0);
    assert_eq!(temp_files(&f), 0);
    assert!(f.session.is_running());
}

#[tokio::test]
async fn test_stop_during_recording_start() {
    let f = fixture(VirtualBackend::new());
    f.backend.update_faults(|faults| faults.stall_recording_start = true);
    f.session.start(StartConfig::default()).await.unwrap();

    let session = f.session.clone();
    let starting = tokio::spawn(async move { session.start_recording(SILENT).await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    tokio::time::timeout(Duration::from_secs(5), f.session.stop())
        .await
        .expect("stop must not hang")
        .unwrap();
    let err = starting.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SessionStopped);
    assert_eq!(f.session.recording_phase(), RecordingPhase::Idle);
    assert_eq!(temp_files(&f), 0);

    f.backend.update_faults(|faults| faults.stall_recording_start = false);
    f.session.start(StartConfig::default()).await.unwrap();
    f.session.start_recording(SILENT).await.unwrap();
}

#[tokio::test]
async fn test_stop_session_discards_recording() {
    let f = fixture(VirtualBackend::new());
    f.session.start(StartConfig::default()).await.unwrap();
    f.session.start_recording(SILENT).await.unwrap();

    f.session.stop().await.unwrap();

    assert_eq!(f.session.recording_phase(), RecordingPhase::Idle);
    assert!(!f.backend.is_recording());
    assert_eq!(f.session.registry().pending_count(), 0);
    assert_eq!(temp_files(&f), 0);
}

#[tokio::test]
async fn test_finalize_failure_keeps_session() {
    let f = fixture(VirtualBackend::new());
    f.backend.update_faults(|faults| faults.fail_finalize = true);
    f.session.start(StartConfig::default()).await.unwrap();
    f.session.start_recording(SILENT).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;

    let err = f.session.stop_recording().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EncodingFailed);
    assert!(f.session.is_running());
    assert_eq!(f.session.recording_phase(), RecordingPhase::Idle);

    // The rejection names the partial file, which survives session teardown
    let message = err.to_rejection().message;
    let (_, kept) = message
        .split_once("partial recording kept at ")
        .expect("rejection should name the kept file");
    let kept = std::path::PathBuf::from(kept);
    assert!(kept.starts_with(f.temp.path()));

    f.session.stop().await.unwrap();
    assert!(kept.exists());
    assert!(std::fs::metadata(&kept).unwrap().len() > 0);
    assert_eq!(f.session.registry().pending_count(), 0);
}
