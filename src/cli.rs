// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for camera operations
//!
//! This module provides command-line functionality for:
//! - Listing available cameras
//! - Taking photos
//! - Recording videos
//! - Scanning barcodes
//!
//! Every command drives the virtual backend through the session controller.

use camera_session::api;
use camera_session::backends::camera::CameraPosition;
use camera_session::backends::virtual_camera::{VirtualBackend, load_image_as_frame};
use camera_session::config::{Settings, StartConfig};
use camera_session::constants::APP_DIR;
use camera_session::pipelines::photo::{CaptureOutput, CaptureRequest};
use camera_session::pipelines::video::RecordingOptions;
use camera_session::session::SessionController;
use chrono::Local;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn controller(backend: VirtualBackend) -> SessionController {
    SessionController::builder(Arc::new(backend))
        .settings(Settings::load())
        .build()
}

/// List all available cameras
pub fn list_cameras() -> Result<(), Box<dyn std::error::Error>> {
    let session = controller(VirtualBackend::new());
    let cameras = session.get_available_devices();

    if cameras.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras:");
    println!();
    for camera in &cameras {
        println!("  [{}] {} ({})", camera.id, camera.name, camera.position);

        let caps = &camera.capabilities;
        println!("      Zoom: {:.1}x-{:.1}x", caps.zoom.min, caps.zoom.max);
        if caps.flash_modes.is_empty() {
            println!("      Flash: none");
        } else {
            let modes: Vec<String> = caps.flash_modes.iter().map(|m| m.to_string()).collect();
            println!("      Flash: {}", modes.join(", "));
        }
        println!();
    }

    Ok(())
}

/// Take a photo from the camera at `position`
pub async fn take_photo(
    position: CameraPosition,
    quality: Option<u8>,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = controller(VirtualBackend::new());
    let quality = quality.unwrap_or(session.settings().default_quality);

    session
        .start(StartConfig {
            position: Some(position),
            ..StartConfig::default()
        })
        .await?;
    if let Some(device) = session.snapshot().device {
        println!("Using camera: {}", device.name);
    }

    println!("Capturing...");
    let captured = session
        .capture(CaptureRequest {
            quality,
            save_to_file: false,
        })
        .await;
    session.stop().await?;

    let bytes = match captured? {
        CaptureOutput::Inline(bytes) => bytes,
        CaptureOutput::File { path, .. } => tokio::fs::read(&path).await?,
    };

    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let output_path = resolve_output(output, get_default_photo_dir, &format!("IMG_{}.jpg", timestamp));
    if let Some(parent) = output_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&output_path, &bytes).await?;

    println!("Photo saved: {} ({} bytes)", output_path.display(), bytes.len());
    Ok(())
}

/// Record a video from the camera at `position`
pub async fn record_video(
    position: CameraPosition,
    duration: u64,
    output: Option<PathBuf>,
    enable_audio: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = controller(VirtualBackend::new());
    session
        .start(StartConfig {
            position: Some(position),
            ..StartConfig::default()
        })
        .await?;

    println!("Duration: {} seconds", duration);
    if enable_audio {
        println!("Audio: enabled");
    }

    if let Err(e) = session
        .start_recording(RecordingOptions {
            enable_audio,
            quality: session.settings().default_quality,
        })
        .await
    {
        session.stop().await?;
        return Err(e.into());
    }

    println!();
    println!("Recording... (press Ctrl+C to stop early)");
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(duration)) => {}
        _ = tokio::signal::ctrl_c() => {
            println!();
            println!("Stopping early...");
        }
    }

    let finished = session.stop_recording().await;
    session.stop().await?;
    let finished = finished?;

    let extension = finished
        .path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("mjpeg")
        .to_string();
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let output_path = resolve_output(
        output,
        get_default_video_dir,
        &format!("VID_{}.{}", timestamp, extension),
    );
    if let Some(parent) = output_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    // Copy rather than rename: the temp dir may be on another filesystem
    tokio::fs::copy(&finished.path, &output_path).await?;
    tokio::fs::remove_file(&finished.path).await?;

    println!();
    println!("Video saved: {}", output_path.display());
    Ok(())
}

/// Print barcode events for `duration` seconds
pub async fn scan_barcodes(duration: u64, image: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let mut backend = VirtualBackend::new();
    if let Some(path) = image.as_deref() {
        backend = backend.with_still_image(load_image_as_frame(path)?);
        println!("Streaming image: {}", path.display());
    }

    let session = controller(backend);
    let mut events = session.subscribe_barcodes();
    session
        .start(StartConfig {
            enable_barcode_detection: true,
            ..StartConfig::default()
        })
        .await?;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(duration);
    let mut last_value: Option<String> = None;
    loop {
        let event = match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Ok(event)) => event,
            Ok(Err(tokio::sync::broadcast::error::RecvError::Lagged(_))) => continue,
            Ok(Err(tokio::sync::broadcast::error::RecvError::Closed)) | Err(_) => break,
        };
        // Repeated sightings of the same code are not interesting here
        if last_value.as_deref() == Some(event.value.as_str()) {
            continue;
        }
        println!("{}", api::barcode_event_payload(&event));
        last_value = Some(event.value);
    }

    session.stop().await?;
    Ok(())
}

/// Use `output` as a file path, or as a directory for `file_name`
fn resolve_output(output: Option<PathBuf>, default_dir: fn() -> PathBuf, file_name: &str) -> PathBuf {
    match output {
        Some(path) if path.is_dir() => path.join(file_name),
        Some(path) => path,
        None => default_dir().join(file_name),
    }
}

fn home_or_current() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn get_default_photo_dir() -> PathBuf {
    dirs::picture_dir()
        .unwrap_or_else(home_or_current)
        .join(APP_DIR)
}

fn get_default_video_dir() -> PathBuf {
    dirs::video_dir()
        .unwrap_or_else(home_or_current)
        .join(APP_DIR)
}
