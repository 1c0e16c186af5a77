// SPDX-License-Identifier: GPL-3.0-only

//! In-process camera backend
//!
//! Simulates a device pipeline entirely in software so the session core can
//! run without hardware: the CLI drives it and every test runs against it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ Frame generator  │  ← tokio task: test pattern or looped still
//! └────────┬─────────┘
//!          │ broadcast
//!    ┌─────┴──────────────┬───────────────────┐
//!    ▼                    ▼                   ▼
//! latest frame       frame subscribers    MJPEG recorder
//! (still/sample)     (barcode, preview)   (tokio task → file)
//! ```
//!
//! Fault injection lets tests reproduce busy devices, rejected outputs,
//! recorders that never confirm and disconnects.

mod file_source;

pub use file_source::{load_image_as_frame, test_pattern};

use crate::backends::camera::types::*;
use crate::backends::camera::CameraBackend;
use crate::constants::virtual_camera as defaults;
use crate::pipelines::photo::encoding::{encode_full_frame, jpeg_quality};
use futures::future::BoxFuture;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Failures the virtual backend should simulate
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    /// Device ids whose acquisition fails as busy
    pub fail_acquire: HashSet<String>,
    /// Outputs the pipeline refuses to add
    pub fail_attach: HashSet<OutputKind>,
    /// Recording start never confirms
    pub stall_recording_start: bool,
    /// The recorder fails while finalizing
    pub fail_finalize: bool,
    /// Extra latency before acquisition completes
    pub acquire_delay: Option<Duration>,
    /// The device reports itself gone as soon as it has been opened
    pub disconnect_after_acquire: bool,
}

/// Build a device with modest capabilities
pub fn virtual_device(id: &str, position: CameraPosition, device_type: DeviceType) -> CameraDevice {
    CameraDevice {
        id: id.to_string(),
        name: format!("Virtual {} camera ({})", position, id),
        position,
        device_type,
        capabilities: DeviceCapabilities {
            zoom: ZoomRange::new(1.0, 2.0),
            flash_modes: Vec::new(),
            fast_sample: true,
        },
    }
}

/// Default device set: two back modules and one front camera
pub fn default_devices() -> Vec<CameraDevice> {
    vec![
        CameraDevice {
            id: "virtual-back-wide".into(),
            name: "Virtual Back Camera".into(),
            position: CameraPosition::Back,
            device_type: DeviceType::WideAngle,
            capabilities: DeviceCapabilities {
                zoom: ZoomRange::new(1.0, 10.0),
                flash_modes: vec![FlashMode::Off, FlashMode::On, FlashMode::Auto, FlashMode::Torch],
                fast_sample: true,
            },
        },
        CameraDevice {
            id: "virtual-back-ultrawide".into(),
            name: "Virtual Back Ultra Wide Camera".into(),
            position: CameraPosition::Back,
            device_type: DeviceType::UltraWide,
            capabilities: DeviceCapabilities {
                zoom: ZoomRange::new(1.0, 2.0),
                flash_modes: vec![FlashMode::Off, FlashMode::Torch],
                fast_sample: true,
            },
        },
        CameraDevice {
            id: "virtual-front".into(),
            name: "Virtual Front Camera".into(),
            position: CameraPosition::Front,
            device_type: DeviceType::TrueDepth,
            capabilities: DeviceCapabilities {
                zoom: ZoomRange::new(1.0, 4.0),
                flash_modes: Vec::new(),
                fast_sample: false,
            },
        },
    ]
}

struct ActiveStream {
    device: CameraDevice,
    frames: broadcast::Sender<Arc<CameraFrame>>,
    latest: Arc<Mutex<Option<Arc<CameraFrame>>>>,
    generator: JoinHandle<()>,
}

struct ActiveRecording {
    stop: oneshot::Sender<()>,
    task: JoinHandle<BackendResult<()>>,
}

#[derive(Default)]
struct VirtualState {
    stream: Option<ActiveStream>,
    outputs: HashSet<OutputKind>,
    audio_input: bool,
    zoom: f32,
    flash: FlashMode,
    recording: Option<ActiveRecording>,
}

#[derive(Default)]
struct Counters {
    acquires: AtomicUsize,
    releases: AtomicUsize,
    audio_attaches: AtomicUsize,
}

/// Software camera backend
pub struct VirtualBackend {
    devices: Vec<CameraDevice>,
    compatibility: CompatibilityTable,
    frame_size: (u32, u32),
    frame_interval: Duration,
    still: Option<CameraFrame>,
    state: Mutex<VirtualState>,
    faults: Mutex<FaultPlan>,
    events: broadcast::Sender<BackendEvent>,
    sequence: Arc<AtomicU64>,
    counters: Counters,
}

impl Default for VirtualBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualBackend {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            devices: default_devices(),
            compatibility: CompatibilityTable::permissive(),
            frame_size: (defaults::FRAME_WIDTH, defaults::FRAME_HEIGHT),
            frame_interval: defaults::FRAME_INTERVAL,
            still: None,
            state: Mutex::new(VirtualState::default()),
            faults: Mutex::new(FaultPlan::default()),
            events,
            sequence: Arc::new(AtomicU64::new(0)),
            counters: Counters::default(),
        }
    }

    pub fn with_devices(mut self, devices: Vec<CameraDevice>) -> Self {
        self.devices = devices;
        self
    }

    pub fn with_compatibility(mut self, table: CompatibilityTable) -> Self {
        self.compatibility = table;
        self
    }

    pub fn with_frame_size(mut self, width: u32, height: u32) -> Self {
        self.frame_size = (width.max(1), height.max(1));
        self
    }

    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Stream a fixed image instead of the test pattern
    pub fn with_still_image(mut self, frame: CameraFrame) -> Self {
        self.still = Some(frame);
        self
    }

    fn state(&self) -> MutexGuard<'_, VirtualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn faults(&self) -> FaultPlan {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set_faults(&self, faults: FaultPlan) {
        *self.faults.lock().unwrap_or_else(PoisonError::into_inner) = faults;
    }

    pub fn update_faults(&self, update: impl FnOnce(&mut FaultPlan)) {
        update(&mut self.faults.lock().unwrap_or_else(PoisonError::into_inner));
    }

    // ===== Inspection =====

    pub fn acquire_count(&self) -> usize {
        self.counters.acquires.load(Ordering::SeqCst)
    }

    pub fn release_count(&self) -> usize {
        self.counters.releases.load(Ordering::SeqCst)
    }

    pub fn audio_attach_count(&self) -> usize {
        self.counters.audio_attaches.load(Ordering::SeqCst)
    }

    pub fn attached_outputs(&self) -> HashSet<OutputKind> {
        self.state().outputs.clone()
    }

    pub fn audio_input_attached(&self) -> bool {
        self.state().audio_input
    }

    pub fn active_device(&self) -> Option<CameraDevice> {
        self.state().stream.as_ref().map(|s| s.device.clone())
    }

    pub fn zoom(&self) -> f32 {
        self.state().zoom
    }

    pub fn flash_mode(&self) -> FlashMode {
        self.state().flash
    }

    pub fn is_recording(&self) -> bool {
        self.state().recording.is_some()
    }

    // ===== Simulation =====

    /// Report the active device as gone
    pub fn simulate_disconnect(&self) {
        let Some(device_id) = self.state().stream.as_ref().map(|s| s.device.id.clone()) else {
            return;
        };
        warn!(device = %device_id, "Simulating camera disconnect");
        let _ = self.events.send(BackendEvent::Disconnected { device_id });
    }

    /// Inject a frame into the live stream
    pub fn push_frame(&self, frame: CameraFrame) {
        let state = self.state();
        let Some(stream) = state.stream.as_ref() else {
            return;
        };
        let frame = Arc::new(frame);
        *stream.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame.clone());
        let _ = stream.frames.send(frame);
    }

    fn next_frame(&self, position: CameraPosition) -> CameraFrame {
        next_frame(&self.still, self.frame_size, &self.sequence, position)
    }

    fn latest_frame(&self) -> BackendResult<CameraFrame> {
        let state = self.state();
        let stream = state
            .stream
            .as_ref()
            .ok_or_else(|| BackendError::NotAvailable("no active device".into()))?;
        let latest = stream.latest.lock().unwrap_or_else(PoisonError::into_inner);
        latest
            .as_ref()
            .map(|frame| (**frame).clone())
            .ok_or_else(|| BackendError::NotAvailable("no frame received yet".into()))
    }

    /// Tear down stream and recorder; returns whether a device was active
    fn stop_stream(&self) -> bool {
        let (stream, recording) = {
            let mut state = self.state();
            state.outputs.clear();
            state.audio_input = false;
            (state.stream.take(), state.recording.take())
        };
        if let Some(recording) = recording {
            warn!("Releasing device with an unfinished recording");
            recording.task.abort();
        }
        match stream {
            Some(stream) => {
                stream.generator.abort();
                debug!(device = %stream.device.id, "Virtual stream stopped");
                true
            }
            None => false,
        }
    }
}

fn next_frame(
    still: &Option<CameraFrame>,
    frame_size: (u32, u32),
    sequence: &AtomicU64,
    position: CameraPosition,
) -> CameraFrame {
    let seq = sequence.fetch_add(1, Ordering::SeqCst);
    match still {
        Some(still) => file_source::restamp(still, seq),
        None => test_pattern(frame_size.0, frame_size.1, seq, position),
    }
}

impl CameraBackend for VirtualBackend {
    fn enumerate_cameras(&self) -> Vec<CameraDevice> {
        self.devices.clone()
    }

    fn compatibility(&self) -> CompatibilityTable {
        self.compatibility.clone()
    }

    fn acquire<'a>(&'a self, device: &'a CameraDevice) -> BoxFuture<'a, BackendResult<()>> {
        Box::pin(async move {
            let faults = self.faults();
            if let Some(delay) = faults.acquire_delay {
                tokio::time::sleep(delay).await;
            }
            if !self.devices.iter().any(|d| d.id == device.id) {
                return Err(BackendError::DeviceNotFound(device.id.clone()));
            }
            if faults.fail_acquire.contains(&device.id) {
                return Err(BackendError::DeviceBusy(format!(
                    "{} is in use by another client",
                    device.id
                )));
            }

            self.stop_stream();

            let (frames, _) = broadcast::channel(defaults::FRAME_CHANNEL_CAPACITY);
            let first = Arc::new(self.next_frame(device.position));
            let latest = Arc::new(Mutex::new(Some(first)));

            let generator = {
                let frames = frames.clone();
                let latest = latest.clone();
                let still = self.still.clone();
                let frame_size = self.frame_size;
                let sequence = self.sequence.clone();
                let position = device.position;
                let mut ticker = tokio::time::interval(self.frame_interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                tokio::spawn(async move {
                    // First tick completes immediately; the primed frame covers it
                    ticker.tick().await;
                    loop {
                        ticker.tick().await;
                        let frame = Arc::new(next_frame(&still, frame_size, &sequence, position));
                        trace!(sequence = frame.sequence, "Virtual frame");
                        *latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame.clone());
                        let _ = frames.send(frame);
                    }
                })
            };

            {
                let mut state = self.state();
                state.stream = Some(ActiveStream {
                    device: device.clone(),
                    frames,
                    latest,
                    generator,
                });
                state.zoom = device.capabilities.zoom.min;
                state.flash = FlashMode::Off;
            }
            self.counters.acquires.fetch_add(1, Ordering::SeqCst);
            info!(device = %device.id, "Virtual camera acquired");
            if faults.disconnect_after_acquire {
                self.simulate_disconnect();
            }
            Ok(())
        })
    }

    fn release(&self) -> BoxFuture<'_, BackendResult<()>> {
        Box::pin(async move {
            if self.stop_stream() {
                self.counters.releases.fetch_add(1, Ordering::SeqCst);
                info!("Virtual camera released");
            }
            Ok(())
        })
    }

    fn is_acquired(&self) -> bool {
        self.state().stream.is_some()
    }

    fn attach_output(&self, kind: OutputKind) -> BackendResult<()> {
        let refuse = self.faults().fail_attach.contains(&kind);
        let mut state = self.state();
        if state.stream.is_none() {
            return Err(BackendError::NotAvailable("no active device".into()));
        }
        if refuse {
            return Err(BackendError::OutputUnsupported(format!(
                "pipeline cannot add a {} output",
                kind
            )));
        }
        state.outputs.insert(kind);
        Ok(())
    }

    fn detach_output(&self, kind: OutputKind) -> BackendResult<()> {
        self.state().outputs.remove(&kind);
        Ok(())
    }

    fn attach_audio_input(&self) -> BackendResult<()> {
        let mut state = self.state();
        if state.stream.is_none() {
            return Err(BackendError::NotAvailable("no active device".into()));
        }
        state.audio_input = true;
        self.counters.audio_attaches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn detach_audio_input(&self) -> BackendResult<()> {
        self.state().audio_input = false;
        Ok(())
    }

    fn capabilities(&self) -> DeviceCapabilities {
        self.state()
            .stream
            .as_ref()
            .map(|s| s.device.capabilities.clone())
            .unwrap_or_default()
    }

    fn set_zoom(&self, factor: f32, ramp: bool) -> BackendResult<()> {
        let mut state = self.state();
        let range = state
            .stream
            .as_ref()
            .map(|s| s.device.capabilities.zoom)
            .ok_or_else(|| BackendError::NotAvailable("no active device".into()))?;
        if !range.contains(factor) {
            return Err(BackendError::Other(format!(
                "zoom {} outside {}..{}",
                factor, range.min, range.max
            )));
        }
        debug!(factor, ramp, "Virtual zoom");
        state.zoom = factor;
        Ok(())
    }

    fn set_flash_mode(&self, mode: FlashMode) -> BackendResult<()> {
        let mut state = self.state();
        let supported = state
            .stream
            .as_ref()
            .map(|s| s.device.capabilities.flash_modes.contains(&mode))
            .ok_or_else(|| BackendError::NotAvailable("no active device".into()))?;
        if !supported {
            return Err(BackendError::Other(format!("flash mode {} unsupported", mode)));
        }
        state.flash = mode;
        Ok(())
    }

    fn capture_still(&self) -> BoxFuture<'_, BackendResult<CameraFrame>> {
        Box::pin(async move {
            if !self.state().outputs.contains(&OutputKind::Photo) {
                return Err(BackendError::NotAvailable("photo output not attached".into()));
            }
            tokio::time::sleep(defaults::SHUTTER_LATENCY).await;
            self.latest_frame()
        })
    }

    fn sample_frame(&self) -> BackendResult<CameraFrame> {
        self.latest_frame()
    }

    fn frames(&self) -> Option<FrameReceiver> {
        self.state().stream.as_ref().map(|s| s.frames.subscribe())
    }

    fn recording_extension(&self) -> &'static str {
        "mjpeg"
    }

    fn start_recording(&self, request: RecordingRequest) -> BoxFuture<'_, BackendResult<()>> {
        Box::pin(async move {
            let faults = self.faults();
            if faults.stall_recording_start {
                warn!("Recording start stalled by fault plan");
                futures::future::pending::<()>().await;
            }

            let (started_tx, started_rx) = oneshot::channel();
            {
                let mut state = self.state();
                let frames = state
                    .stream
                    .as_ref()
                    .map(|s| s.frames.subscribe())
                    .ok_or_else(|| BackendError::NotAvailable("no active device".into()))?;
                if !state.outputs.contains(&OutputKind::Recording) {
                    return Err(BackendError::OutputUnsupported(
                        "recording output not attached".into(),
                    ));
                }
                if state.recording.is_some() {
                    return Err(BackendError::DeviceBusy("recorder already running".into()));
                }

                let (stop_tx, stop_rx) = oneshot::channel();
                info!(path = %request.path.display(), audio = request.audio, "Starting virtual recorder");
                let task = tokio::spawn(record_mjpeg(
                    frames,
                    request,
                    started_tx,
                    stop_rx,
                    faults.fail_finalize,
                ));
                state.recording = Some(ActiveRecording { stop: stop_tx, task });
            }

            match started_rx.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => {
                    self.state().recording.take();
                    Err(e)
                }
                Err(_) => {
                    self.state().recording.take();
                    Err(BackendError::RecordingFailed(
                        "recorder exited before writing a frame".into(),
                    ))
                }
            }
        })
    }

    fn stop_recording(&self) -> BoxFuture<'_, BackendResult<()>> {
        Box::pin(async move {
            let recording = self
                .state()
                .recording
                .take()
                .ok_or(BackendError::NoRecordingInProgress)?;
            let _ = recording.stop.send(());
            match recording.task.await {
                Ok(result) => result,
                Err(e) => Err(BackendError::RecordingFailed(format!("recorder task failed: {}", e))),
            }
        })
    }

    fn events(&self) -> broadcast::Receiver<BackendEvent> {
        self.events.subscribe()
    }

    fn backend_type(&self) -> &'static str {
        "virtual"
    }
}

/// Write every received frame as a JPEG into one file
///
/// `started` resolves after the first frame is on disk, or with the error
/// that prevented it.
async fn record_mjpeg(
    mut frames: FrameReceiver,
    request: RecordingRequest,
    started: oneshot::Sender<BackendResult<()>>,
    mut stop: oneshot::Receiver<()>,
    fail_finalize: bool,
) -> BackendResult<()> {
    let mut started = Some(started);
    let result = write_frames(&mut frames, &request, &mut started, &mut stop).await;

    if let Err(e) = &result {
        if let Some(tx) = started.take() {
            let _ = tx.send(Err(e.clone()));
        }
        return result;
    }
    if fail_finalize {
        warn!(path = %request.path.display(), "Recorder finalize failure injected");
        return Err(BackendError::RecordingFailed("muxer failed to finalize".into()));
    }
    result
}

async fn write_frames(
    frames: &mut FrameReceiver,
    request: &RecordingRequest,
    started: &mut Option<oneshot::Sender<BackendResult<()>>>,
    stop: &mut oneshot::Receiver<()>,
) -> BackendResult<()> {
    let mut file = tokio::fs::File::create(&request.path).await?;
    let quality = jpeg_quality(request.quality);
    let mut written: u64 = 0;

    loop {
        let frame = tokio::select! {
            biased;
            _ = &mut *stop => break,
            frame = frames.recv() => frame,
        };

        let frame = match frame {
            Ok(frame) => frame,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                trace!(skipped, "Recorder lagging behind stream");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let jpeg = tokio::task::spawn_blocking(move || encode_full_frame(&frame, quality))
            .await
            .map_err(|e| BackendError::EncodingFailed(e.to_string()))?
            .map_err(|e| BackendError::EncodingFailed(e.to_string()))?;
        file.write_all(&jpeg).await?;
        written += 1;

        if let Some(tx) = started.take() {
            debug!(path = %request.path.display(), "First recording frame written");
            let _ = tx.send(Ok(()));
        }
    }

    file.flush().await?;
    file.sync_all().await?;
    info!(path = %request.path.display(), frames = written, "Virtual recording finalized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn back_wide(backend: &VirtualBackend) -> CameraDevice {
        backend.enumerate_cameras().remove(0)
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let backend = VirtualBackend::new();
        let device = back_wide(&backend);

        backend.acquire(&device).await.unwrap();
        assert!(backend.is_acquired());
        assert_eq!(backend.capabilities().zoom, ZoomRange::new(1.0, 10.0));
        assert!(backend.sample_frame().is_ok());

        backend.release().await.unwrap();
        backend.release().await.unwrap();
        assert!(!backend.is_acquired());
        assert_eq!((backend.acquire_count(), backend.release_count()), (1, 1));
    }

    #[tokio::test]
    async fn test_injected_faults() {
        let backend = VirtualBackend::new();
        let device = back_wide(&backend);
        backend.update_faults(|f| {
            f.fail_acquire.insert(device.id.clone());
        });
        assert!(matches!(
            backend.acquire(&device).await,
            Err(BackendError::DeviceBusy(_))
        ));

        backend.set_faults(FaultPlan {
            fail_attach: [OutputKind::Photo].into_iter().collect(),
            ..FaultPlan::default()
        });
        backend.acquire(&device).await.unwrap();
        assert!(backend.attach_output(OutputKind::Preview).is_ok());
        assert!(matches!(
            backend.attach_output(OutputKind::Photo),
            Err(BackendError::OutputUnsupported(_))
        ));
    }

    #[tokio::test]
    async fn test_still_capture_requires_photo_output() {
        let backend = VirtualBackend::new().with_frame_size(64, 48);
        backend.acquire(&back_wide(&backend)).await.unwrap();
        assert!(backend.capture_still().await.is_err());

        backend.attach_output(OutputKind::Photo).unwrap();
        let frame = backend.capture_still().await.unwrap();
        assert_eq!((frame.width, frame.height), (64, 48));
    }

    #[tokio::test]
    async fn test_mjpeg_recording_writes_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mjpeg");
        let backend = VirtualBackend::new()
            .with_frame_size(32, 24)
            .with_frame_interval(Duration::from_millis(5));
        backend.acquire(&back_wide(&backend)).await.unwrap();
        backend.attach_output(OutputKind::Recording).unwrap();

        backend
            .start_recording(RecordingRequest {
                path: path.clone(),
                audio: false,
                quality: 0.8,
            })
            .await
            .unwrap();
        assert!(backend.is_recording());
        backend.stop_recording().await.unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        assert!(matches!(
            backend.stop_recording().await,
            Err(BackendError::NoRecordingInProgress)
        ));
    }

    #[tokio::test]
    async fn test_disconnect_event() {
        let backend = VirtualBackend::new();
        let mut events = backend.events();
        backend.acquire(&back_wide(&backend)).await.unwrap();
        backend.simulate_disconnect();
        assert_eq!(
            events.recv().await.unwrap(),
            BackendEvent::Disconnected {
                device_id: "virtual-back-wide".into()
            }
        );
    }
}
