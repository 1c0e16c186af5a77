// SPDX-License-Identifier: GPL-3.0-only

//! Live barcode scanning
//!
//! While a session runs with barcode detection enabled, a scanner task reads
//! the live frame stream, analyses at most one frame per interval and
//! broadcasts the best result of each analysed frame. The task ends when the
//! session generation it was spawned for ends.

pub mod detector;

pub use detector::{BarcodeDetector, QrDetector};

use crate::backends::camera::types::{CameraFrame, FrameReceiver};
use crate::pipelines::display::{DisplayTransform, FrameRegion, PixelRect, PreviewViewport};
use crate::session::generation::GenerationToken;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Normalised barcode symbology tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BarcodeType {
    #[serde(rename = "QR_CODE")]
    QrCode,
    #[serde(rename = "AZTEC")]
    Aztec,
    #[serde(rename = "CODABAR")]
    Codabar,
    #[serde(rename = "CODE_39")]
    Code39,
    #[serde(rename = "CODE_93")]
    Code93,
    #[serde(rename = "CODE_128")]
    Code128,
    #[serde(rename = "DATA_MATRIX")]
    DataMatrix,
    #[serde(rename = "EAN_8")]
    Ean8,
    #[serde(rename = "EAN_13")]
    Ean13,
    #[serde(rename = "ITF")]
    Itf,
    #[serde(rename = "PDF_417")]
    Pdf417,
    #[serde(rename = "UPC_A")]
    UpcA,
    #[serde(rename = "UPC_E")]
    UpcE,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

/// One decoded symbol in frame pixel coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct BarcodeDetection {
    pub value: String,
    pub display_value: String,
    pub kind: BarcodeType,
    /// 0.0 to 1.0
    pub confidence: f32,
    pub bounds: PixelRect,
}

/// `barcodeDetected` event payload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BarcodeEvent {
    pub value: String,
    pub display_value: String,
    #[serde(rename = "type")]
    pub kind: BarcodeType,
    /// Normalised to the displayed preview
    pub bounding_rect: FrameRegion,
}

/// What one scanner task runs against
pub struct ScanContext {
    pub token: GenerationToken,
    pub viewport: Option<PreviewViewport>,
    /// Empty means every type
    pub types: Vec<BarcodeType>,
    pub frames: FrameReceiver,
}

/// Spawns scanner tasks and owns the event channel
pub struct BarcodeScanner {
    detector: Arc<dyn BarcodeDetector>,
    events: broadcast::Sender<BarcodeEvent>,
    min_interval: Duration,
}

impl BarcodeScanner {
    pub fn new(
        detector: Arc<dyn BarcodeDetector>,
        events: broadcast::Sender<BarcodeEvent>,
        min_interval: Duration,
    ) -> Self {
        Self {
            detector,
            events,
            min_interval,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BarcodeEvent> {
        self.events.subscribe()
    }

    /// Start scanning the given stream until the token's generation ends
    pub fn spawn(&self, ctx: ScanContext) -> JoinHandle<()> {
        info!(
            detector = self.detector.name(),
            interval_ms = self.min_interval.as_millis() as u64,
            types = ?ctx.types,
            "Starting barcode scanner"
        );
        tokio::spawn(scan_loop(
            self.detector.clone(),
            self.events.clone(),
            self.min_interval,
            ctx,
        ))
    }
}

async fn scan_loop(
    detector: Arc<dyn BarcodeDetector>,
    events: broadcast::Sender<BarcodeEvent>,
    min_interval: Duration,
    mut ctx: ScanContext,
) {
    let mut last_analysed: Option<tokio::time::Instant> = None;

    loop {
        let received = tokio::select! {
            biased;
            reason = ctx.token.cancelled() => {
                debug!(?reason, "Barcode scanner stopping");
                break;
            }
            frame = ctx.frames.recv() => frame,
        };

        let frame = match received {
            Ok(frame) => frame,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                trace!(skipped, "Barcode scanner lagging");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("Frame stream closed, barcode scanner stopping");
                break;
            }
        };

        let now = tokio::time::Instant::now();
        if last_analysed.is_some_and(|last| now.duration_since(last) < min_interval) {
            trace!(sequence = frame.sequence, "Frame dropped by scan interval");
            continue;
        }
        last_analysed = Some(now);

        let Some(event) = analyse(&detector, frame, &ctx).await else {
            continue;
        };

        if !ctx.token.is_current() {
            debug!("Discarding barcode result from a previous session");
            break;
        }
        debug!(value = %event.value, kind = ?event.kind, "Barcode detected");
        let _ = events.send(event);
    }
}

async fn analyse(
    detector: &Arc<dyn BarcodeDetector>,
    frame: Arc<CameraFrame>,
    ctx: &ScanContext,
) -> Option<BarcodeEvent> {
    let transform = DisplayTransform::new(frame.width, frame.height, ctx.viewport);
    let task_detector = detector.clone();
    let types = ctx.types.clone();
    let detections = match tokio::task::spawn_blocking(move || task_detector.detect(&frame, &types)).await {
        Ok(Ok(detections)) => detections,
        Ok(Err(e)) => {
            debug!(error = %e, "Barcode detection failed on frame");
            return None;
        }
        Err(e) => {
            warn!(error = %e, "Barcode detection task panicked");
            return None;
        }
    };

    let filter: &[BarcodeType] = if detector.supports_type_filter() {
        ctx.types.as_slice()
    } else {
        &[]
    };
    best_detection(detections, filter).map(|best| BarcodeEvent {
        bounding_rect: transform.to_display(best.bounds),
        value: best.value,
        display_value: best.display_value,
        kind: best.kind,
    })
}

/// Highest-confidence detection allowed by `filter` (first one wins ties)
fn best_detection(detections: Vec<BarcodeDetection>, filter: &[BarcodeType]) -> Option<BarcodeDetection> {
    detections
        .into_iter()
        .filter(|d| filter.is_empty() || filter.contains(&d.kind))
        .fold(None, |best: Option<BarcodeDetection>, candidate| match best {
            Some(best) if best.confidence >= candidate.confidence => Some(best),
            _ => Some(candidate),
        })
}
