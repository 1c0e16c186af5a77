// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for live barcode scanning

mod common;

use camera_session::backends::camera::CameraFrame;
use camera_session::backends::virtual_camera::VirtualBackend;
use camera_session::config::{Settings, StartConfig};
use camera_session::pipelines::barcode::{BarcodeDetection, BarcodeDetector, BarcodeEvent, BarcodeType};
use camera_session::pipelines::display::{PixelRect, PreviewFit, PreviewViewport};
use common::{fixture, fixture_with};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;

/// Reports the same symbols on every frame
struct ScriptedDetector {
    detections: Vec<BarcodeDetection>,
    scoped: bool,
    calls: AtomicUsize,
}

impl ScriptedDetector {
    fn new(detections: Vec<BarcodeDetection>) -> Self {
        Self {
            detections,
            scoped: false,
            calls: AtomicUsize::new(0),
        }
    }
}

impl BarcodeDetector for ScriptedDetector {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn supports_type_filter(&self) -> bool {
        self.scoped
    }

    fn detect(&self, _frame: &CameraFrame, _types: &[BarcodeType]) -> Result<Vec<BarcodeDetection>, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.detections.clone())
    }
}

fn detection(value: &str, kind: BarcodeType, confidence: f32, bounds: PixelRect) -> BarcodeDetection {
    BarcodeDetection {
        value: value.into(),
        display_value: value.into(),
        kind,
        confidence,
        bounds,
    }
}

fn scanning() -> StartConfig {
    StartConfig {
        enable_barcode_detection: true,
        ..StartConfig::default()
    }
}

async fn next_event(events: &mut broadcast::Receiver<BarcodeEvent>) -> BarcodeEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("barcode event")
        .expect("open channel")
}

#[tokio::test]
async fn test_events_are_normalized_for_any_resolution() {
    for (width, height) in [(320, 240), (1920, 1080), (37, 19), (64, 480)] {
        let detector = Arc::new(ScriptedDetector::new(vec![detection(
            "hello",
            BarcodeType::QrCode,
            1.0,
            PixelRect {
                x: -5.0,
                y: height as f32 / 4.0,
                width: width as f32,
                height: height as f32,
            },
        )]));
        let f = fixture_with(
            VirtualBackend::new().with_frame_size(width, height),
            |b| b.detector(detector.clone()),
        );
        let mut events = f.session.subscribe_barcodes();
        f.session
            .start(StartConfig {
                preview: Some(PreviewViewport {
                    width: 300,
                    height: 500,
                    fit: PreviewFit::Cover,
                }),
                ..scanning()
            })
            .await
            .unwrap();

        let event = next_event(&mut events).await;
        let rect = event.bounding_rect;
        assert_eq!(event.value, "hello");
        assert!(rect.is_normalized(), "{}x{} gave {:?}", width, height, rect);
        f.session.stop().await.unwrap();
    }
}

#[tokio::test]
async fn test_event_payload_shape() {
    let detector = Arc::new(ScriptedDetector::new(vec![detection(
        "https://example.com",
        BarcodeType::QrCode,
        1.0,
        PixelRect {
            x: 80.0,
            y: 60.0,
            width: 160.0,
            height: 120.0,
        },
    )]));
    let f = fixture_with(VirtualBackend::new().with_frame_size(320, 240), |b| {
        b.detector(detector.clone())
    });
    let mut events = f.session.subscribe_barcodes();
    f.session.start(scanning()).await.unwrap();

    let event = next_event(&mut events).await;
    let payload = camera_session::api::barcode_event_payload(&event);
    assert_eq!(payload["value"], "https://example.com");
    assert_eq!(payload["displayValue"], "https://example.com");
    assert_eq!(payload["type"], "QR_CODE");
    assert_eq!(payload["boundingRect"]["x"], 0.25);
    assert_eq!(payload["boundingRect"]["width"], 0.5);
}

#[tokio::test]
async fn test_best_detection_wins() {
    let rect = PixelRect {
        x: 0.0,
        y: 0.0,
        width: 10.0,
        height: 10.0,
    };
    let detector = Arc::new(ScriptedDetector::new(vec![
        detection("weak", BarcodeType::QrCode, 0.4, rect),
        detection("strong", BarcodeType::Ean13, 0.9, rect),
    ]));
    let f = fixture_with(VirtualBackend::new(), |b| b.detector(detector.clone()));
    let mut events = f.session.subscribe_barcodes();
    f.session.start(scanning()).await.unwrap();

    assert_eq!(next_event(&mut events).await.value, "strong");
}

#[tokio::test]
async fn test_type_filter_applies_to_scoped_detectors() {
    let rect = PixelRect {
        x: 0.0,
        y: 0.0,
        width: 10.0,
        height: 10.0,
    };
    let mut scripted = ScriptedDetector::new(vec![
        detection("product", BarcodeType::Ean13, 0.9, rect),
        detection("link", BarcodeType::QrCode, 0.5, rect),
    ]);
    scripted.scoped = true;
    let detector = Arc::new(scripted);
    let f = fixture_with(VirtualBackend::new(), |b| b.detector(detector.clone()));
    let mut events = f.session.subscribe_barcodes();
    f.session
        .start(StartConfig {
            barcode_types: vec![BarcodeType::QrCode],
            ..scanning()
        })
        .await
        .unwrap();

    for _ in 0..3 {
        assert_eq!(next_event(&mut events).await.kind, BarcodeType::QrCode);
    }
}

#[tokio::test]
async fn test_no_events_after_stop() {
    let detector = Arc::new(ScriptedDetector::new(vec![detection(
        "code",
        BarcodeType::QrCode,
        1.0,
        PixelRect {
            x: 0.0,
            y: 0.0,
            width: 10.0,
            height: 10.0,
        },
    )]));
    let f = fixture_with(VirtualBackend::new(), |b| b.detector(detector.clone()));
    let mut events = f.session.subscribe_barcodes();
    f.session.start(scanning()).await.unwrap();
    next_event(&mut events).await;

    f.session.stop().await.unwrap();
    while events.try_recv().is_ok() {}
    let calls = detector.calls.load(Ordering::SeqCst);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(matches!(
        events.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));
    assert_eq!(detector.calls.load(Ordering::SeqCst), calls);
}

#[tokio::test]
async fn test_scan_rate_is_limited() {
    let detector = Arc::new(ScriptedDetector::new(Vec::new()));
    let temp = tempfile::tempdir().unwrap();
    let settings = Settings {
        barcode_interval_ms: 200,
        ..common::settings(&temp)
    };
    let f = fixture_with(
        VirtualBackend::new().with_frame_interval(Duration::from_millis(10)),
        |b| b.detector(detector.clone()).settings(settings),
    );
    f.session.start(scanning()).await.unwrap();

    tokio::time::sleep(Duration::from_millis(1_000)).await;
    f.session.stop().await.unwrap();

    let calls = detector.calls.load(Ordering::SeqCst);
    assert!(calls >= 1, "scanner never ran");
    assert!(calls <= 7, "analysed {} frames in one second", calls);
}

#[tokio::test]
async fn test_scanning_disabled_by_default() {
    let f = fixture(VirtualBackend::new());
    let mut events = f.session.subscribe_barcodes();
    f.session.start(StartConfig::default()).await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(matches!(
        events.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));
}
