// SPDX-License-Identifier: GPL-3.0-only

//! Shared fixtures for integration tests

#![allow(dead_code)]

use camera_session::backends::virtual_camera::VirtualBackend;
use camera_session::config::Settings;
use camera_session::session::{SessionController, SessionControllerBuilder};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Controller over `backend` with temp files in a private directory
pub struct Fixture {
    pub backend: Arc<VirtualBackend>,
    pub session: SessionController,
    pub temp: TempDir,
}

pub fn settings(temp: &TempDir) -> Settings {
    Settings {
        temp_dir: Some(temp.path().to_path_buf()),
        teardown_timeout_ms: 500,
        capture_drain_timeout_ms: 500,
        recording_confirm_timeout_ms: 2_000,
        ..Settings::default()
    }
}

pub fn fixture(backend: VirtualBackend) -> Fixture {
    fixture_with(backend, |builder| builder)
}

pub fn fixture_with(
    backend: VirtualBackend,
    configure: impl FnOnce(SessionControllerBuilder) -> SessionControllerBuilder,
) -> Fixture {
    let temp = tempfile::tempdir().expect("temp dir");
    let backend = Arc::new(backend);
    let builder = SessionController::builder(backend.clone()).settings(settings(&temp));
    let session = configure(builder).build();
    Fixture {
        backend,
        session,
        temp,
    }
}

/// Poll `condition` for up to two seconds
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Files currently in the fixture's temp directory
pub fn temp_files(fixture: &Fixture) -> usize {
    std::fs::read_dir(fixture.temp.path())
        .map(|entries| entries.count())
        .unwrap_or(0)
}
