// SPDX-License-Identifier: GPL-3.0-only

//! Camera session lifecycle
//!
//! ```text
//! Idle ─start─▶ Starting ─ready─▶ Running ─stop─▶ Stopping ─released─▶ Idle
//!                  │                 │
//!                  └─failure─▶ Idle  └─flip─▶ Stopping ─▶ Starting (opposite camera)
//! ```
//!
//! Every public operation enters through [`SessionController`]. Mutations
//! (start, stop, flip, start/stop recording) are serialised by one async
//! lock; reads work on snapshots. `stop()` ends the current generation
//! *before* queueing for the lock, so a mutation blocked on the hardware is
//! cancelled instead of delaying the stop.

pub mod generation;
pub mod outputs;
pub mod state;
pub mod zoom_flash;

pub use generation::{GenerationGate, GenerationToken, StopReason};
pub use outputs::OutputCoordinator;
pub use state::{Session, SessionState};
pub use zoom_flash::{RestoredSettings, ZoomFlashController, ZoomState};

use crate::backends::camera::{
    BackendEvent, CameraBackend, CameraDevice, DeviceCatalog, FlashMode, OutputKind,
};
use crate::config::{Settings, StartConfig};
use crate::constants::timing::TASK_JOIN_TIMEOUT;
use crate::constants::barcode::EVENT_CHANNEL_CAPACITY;
use crate::errors::{SessionError, SessionResult};
use crate::permissions::{self, PermissionGate, PermissionKind, PermissionStatus, StaticPermissionGate};
use crate::pipelines::barcode::{BarcodeDetector, BarcodeEvent, BarcodeScanner, QrDetector, ScanContext};
use crate::pipelines::photo::{CaptureContext, CaptureOutput, CaptureRequest, CaptureService};
use crate::pipelines::video::{
    FinishedRecording, RecordingOptions, RecordingPhase, RecordingService, RecordingTimeouts,
};
use crate::storage::{FileUrlResolver, PathResolver, TempFileRegistry};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Default)]
struct SessionTasks {
    scanner: Option<JoinHandle<()>>,
    monitor: Option<JoinHandle<()>>,
}

struct Inner {
    backend: Arc<dyn CameraBackend>,
    permissions: Arc<dyn PermissionGate>,
    catalog: DeviceCatalog,
    outputs: Arc<OutputCoordinator>,
    zoom_flash: ZoomFlashController,
    capture: CaptureService,
    recording: RecordingService,
    scanner: BarcodeScanner,
    registry: Arc<TempFileRegistry>,
    gate: GenerationGate,
    mutation: tokio::sync::Mutex<()>,
    session: RwLock<Session>,
    tasks: Mutex<SessionTasks>,
    settings: Settings,
}

impl Inner {
    fn snapshot(&self) -> Session {
        self.session.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn update(&self, change: impl FnOnce(&mut Session)) {
        change(&mut self.session.write().unwrap_or_else(PoisonError::into_inner));
    }

    fn tasks(&self) -> MutexGuard<'_, SessionTasks> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = self.session.get_mut().unwrap_or_else(PoisonError::into_inner).state;
        if state != SessionState::Idle {
            warn!(?state, "Session controller dropped without stop, camera left acquired");
        }
        let tasks = self.tasks.get_mut().unwrap_or_else(PoisonError::into_inner);
        for handle in [tasks.scanner.take(), tasks.monitor.take()].into_iter().flatten() {
            handle.abort();
        }
    }
}

/// Builder for [`SessionController`]
pub struct SessionControllerBuilder {
    backend: Arc<dyn CameraBackend>,
    permissions: Option<Arc<dyn PermissionGate>>,
    detector: Option<Arc<dyn BarcodeDetector>>,
    resolver: Option<Arc<dyn PathResolver>>,
    settings: Settings,
}

impl SessionControllerBuilder {
    /// Permission surface of the host (defaults to everything granted)
    pub fn permissions(mut self, gate: Arc<dyn PermissionGate>) -> Self {
        self.permissions = Some(gate);
        self
    }

    /// Barcode decoder (defaults to the QR detector)
    pub fn detector(mut self, detector: Arc<dyn BarcodeDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Portable-path policy (defaults to `file://` URLs)
    pub fn path_resolver(mut self, resolver: Arc<dyn PathResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> SessionController {
        let settings = self.settings;
        let backend = self.backend;
        let permissions = self
            .permissions
            .unwrap_or_else(|| Arc::new(StaticPermissionGate::granted()));
        let detector = self
            .detector
            .unwrap_or_else(|| Arc::new(QrDetector::with_max_dimension(settings.barcode_max_dimension)));
        let resolver = self.resolver.unwrap_or_else(|| Arc::new(FileUrlResolver));

        let registry = Arc::new(TempFileRegistry::new(settings.temp_dir(), resolver));
        let outputs = Arc::new(OutputCoordinator::new(
            backend.clone(),
            settings.capture_drain_timeout(),
        ));
        let (barcode_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        info!(
            backend = backend.backend_type(),
            temp_dir = %registry.dir().display(),
            "Creating camera session controller"
        );

        let inner = Inner {
            catalog: DeviceCatalog::new(backend.clone()),
            zoom_flash: ZoomFlashController::new(backend.clone()),
            capture: CaptureService::new(backend.clone(), outputs.clone(), registry.clone()),
            recording: RecordingService::new(
                backend.clone(),
                permissions.clone(),
                outputs.clone(),
                registry.clone(),
                RecordingTimeouts {
                    confirm: settings.recording_confirm_timeout(),
                    teardown: settings.teardown_timeout(),
                },
            ),
            scanner: BarcodeScanner::new(detector, barcode_tx, settings.barcode_interval()),
            backend,
            permissions,
            outputs,
            registry,
            gate: GenerationGate::new(),
            mutation: tokio::sync::Mutex::new(()),
            session: RwLock::new(Session::default()),
            tasks: Mutex::new(SessionTasks::default()),
            settings,
        };

        SessionController {
            inner: Arc::new(inner),
        }
    }
}

/// The single camera session
///
/// Cheap to clone; clones share the session.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl SessionController {
    pub fn builder(backend: Arc<dyn CameraBackend>) -> SessionControllerBuilder {
        SessionControllerBuilder {
            backend,
            permissions: None,
            detector: None,
            resolver: None,
            settings: Settings::default(),
        }
    }

    /// Controller with default collaborators
    pub fn new(backend: Arc<dyn CameraBackend>) -> Self {
        Self::builder(backend).build()
    }

    // ===== Lifecycle =====

    /// Start the session; a no-op when already running
    pub async fn start(&self, config: StartConfig) -> SessionResult<()> {
        let inner = &self.inner;
        let _mutation = inner.mutation.lock().await;

        if inner.snapshot().state == SessionState::Running {
            debug!("Session already running, ignoring start");
            return Ok(());
        }

        let token = inner.gate.token();
        token
            .run(permissions::ensure(inner.permissions.as_ref(), PermissionKind::Camera))
            .await??;

        let device = inner.catalog.resolve(&config.selection())?;
        info!(device = %device.id, position = %device.position, "Starting camera session");
        inner.update(|s| s.state = SessionState::Starting);

        let zoom = config.zoom_factor.unwrap_or(device.capabilities.zoom.min);
        let events = inner.backend.events();
        let brought_up = self
            .bring_up(&device, zoom, FlashMode::Off, config.enable_barcode_detection, &token)
            .await;

        match brought_up {
            Ok(restored) => {
                let template = Session {
                    barcode_enabled: config.enable_barcode_detection,
                    barcode_types: config.barcode_types.clone(),
                    viewport: config.preview,
                    ..Session::default()
                };
                self.commit_running(device, restored, template, events, &token);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Camera session failed to start");
                self.teardown_hardware().await;
                inner.update(|s| *s = Session::default());
                Err(e)
            }
        }
    }

    /// Stop the session; resolves immediately when nothing is running
    pub async fn stop(&self) -> SessionResult<()> {
        self.shutdown(StopReason::Stopped).await;
        Ok(())
    }

    async fn shutdown(&self, reason: StopReason) {
        let inner = &self.inner;
        inner.gate.advance(reason);
        let _mutation = inner.mutation.lock().await;

        if inner.snapshot().state == SessionState::Idle {
            debug!(?reason, "Session already idle");
            return;
        }

        info!(?reason, "Stopping camera session");
        inner.update(|s| s.state = SessionState::Stopping);

        inner.recording.force_stop().await;
        self.stop_tasks().await;
        self.teardown_hardware().await;

        let drained = inner.registry.drain();
        if drained > 0 {
            info!(drained, "Removed unclaimed temp files");
        }

        inner.update(|s| *s = Session::default());
        info!("Camera session stopped");
    }

    /// Switch to the first camera on the opposite side
    pub async fn flip_camera(&self) -> SessionResult<()> {
        let inner = &self.inner;
        let _mutation = inner.mutation.lock().await;

        let previous = inner.snapshot();
        if !previous.is_running() {
            return Err(SessionError::SessionNotRunning);
        }
        if inner.recording.phase() != RecordingPhase::Idle {
            return Err(SessionError::OutputConflict(
                "cannot switch cameras while recording".into(),
            ));
        }
        let current = previous.device.clone().ok_or(SessionError::SessionNotRunning)?;
        let target = inner.catalog.opposite_of(&current)?;

        info!(from = %current.id, to = %target.id, "Flipping camera");
        inner.gate.advance(StopReason::Flipped);
        let token = inner.gate.token();
        inner.update(|s| s.state = SessionState::Stopping);

        self.stop_tasks().await;
        self.teardown_hardware().await;
        inner.registry.drain_generation(previous.generation);
        inner.update(|s| s.state = SessionState::Starting);

        let events = inner.backend.events();
        let flipped = self
            .bring_up(
                &target,
                previous.zoom_factor,
                previous.flash_mode,
                previous.barcode_enabled,
                &token,
            )
            .await;

        let failure = match flipped {
            Ok(restored) => {
                self.commit_running(target, restored, previous, events, &token);
                return Ok(());
            }
            Err(e @ SessionError::SessionStopped(_)) => {
                self.abandon(&token).await;
                return Err(e);
            }
            Err(e) => e,
        };

        warn!(error = %failure, device = %target.id, "Flip failed, restoring previous camera");
        self.teardown_hardware().await;
        let events = inner.backend.events();
        let restored = self
            .bring_up(
                &current,
                previous.zoom_factor,
                previous.flash_mode,
                previous.barcode_enabled,
                &token,
            )
            .await;

        match restored {
            Ok(restored) => {
                self.commit_running(current, restored, previous, events, &token);
                Err(failure)
            }
            Err(e @ SessionError::SessionStopped(_)) => {
                self.abandon(&token).await;
                Err(e)
            }
            Err(rollback) => {
                error!(error = %rollback, device = %current.id, "Could not restore previous camera");
                self.abandon(&token).await;
                Err(SessionError::HardwareAcquisitionFailed(format!(
                    "{}; restoring the previous camera also failed: {}",
                    failure, rollback
                )))
            }
        }
    }

    /// Acquire a device and attach the standing outputs
    async fn bring_up(
        &self,
        device: &CameraDevice,
        zoom: f32,
        flash: FlashMode,
        barcode: bool,
        token: &GenerationToken,
    ) -> SessionResult<RestoredSettings> {
        let inner = &self.inner;
        token
            .run(inner.backend.acquire(device))
            .await?
            .map_err(|e| SessionError::HardwareAcquisitionFailed(e.to_string()))?;

        inner.outputs.attach(OutputKind::Preview).await?;
        let restored = inner.zoom_flash.restore(zoom, flash)?;
        if barcode {
            inner.outputs.attach(OutputKind::BarcodeAnalysis).await?;
        }
        token.check()?;
        Ok(restored)
    }

    /// Detach everything and release the device, each step bounded
    async fn teardown_hardware(&self) {
        let inner = &self.inner;
        if let Err(e) = inner.outputs.detach_all() {
            warn!(error = %e, "Output detach failed during teardown");
        }

        let timeout = inner.settings.teardown_timeout();
        match tokio::time::timeout(timeout, inner.backend.release()).await {
            Ok(Ok(())) => debug!("Camera released"),
            Ok(Err(e)) => warn!(error = %e, "Camera release failed"),
            Err(_) => warn!(
                timeout_ms = timeout.as_millis() as u64,
                "Camera release timed out, abandoning"
            ),
        }
    }

    /// Give up on a session mid-transition and go idle
    async fn abandon(&self, token: &GenerationToken) {
        self.teardown_hardware().await;
        self.inner.registry.drain_generation(token.generation());
        self.inner.update(|s| *s = Session::default());
    }

    fn commit_running(
        &self,
        device: CameraDevice,
        restored: RestoredSettings,
        template: Session,
        events: broadcast::Receiver<BackendEvent>,
        token: &GenerationToken,
    ) {
        let session = Session {
            state: SessionState::Running,
            position: device.position,
            device: Some(device),
            zoom_factor: restored.zoom,
            flash_mode: restored.flash,
            generation: token.generation(),
            ..template
        };
        info!(
            device = session.device_id().unwrap_or_default(),
            zoom = session.zoom_factor,
            flash = %session.flash_mode,
            barcode = session.barcode_enabled,
            "Camera session running"
        );
        self.inner.update(|s| *s = session.clone());
        self.spawn_tasks(&session, events, token);
    }

    /// Start the barcode scanner and the disconnect monitor for this generation
    ///
    /// `events` is subscribed before the device is acquired so a disconnect
    /// during bring-up still reaches the monitor.
    fn spawn_tasks(
        &self,
        session: &Session,
        events: broadcast::Receiver<BackendEvent>,
        token: &GenerationToken,
    ) {
        let inner = &self.inner;
        let mut tasks = inner.tasks();

        if session.barcode_enabled {
            match inner.backend.frames() {
                Some(frames) => {
                    tasks.scanner = Some(inner.scanner.spawn(ScanContext {
                        token: token.clone(),
                        viewport: session.viewport,
                        types: session.barcode_types.clone(),
                        frames,
                    }));
                }
                None => warn!("No live frame stream, barcode scanning disabled"),
            }
        }

        let device_id = session.device_id().unwrap_or_default().to_string();
        tasks.monitor = Some(tokio::spawn(monitor_backend(
            Arc::downgrade(&self.inner),
            events,
            token.clone(),
            device_id,
        )));
    }

    async fn stop_tasks(&self) {
        let (scanner, monitor) = {
            let mut tasks = self.inner.tasks();
            (tasks.scanner.take(), tasks.monitor.take())
        };
        // The monitor ends by itself with its generation and may be the caller
        drop(monitor);

        if let Some(mut scanner) = scanner {
            if tokio::time::timeout(TASK_JOIN_TIMEOUT, &mut scanner).await.is_err() {
                warn!("Barcode scanner did not stop in time, aborting");
                scanner.abort();
            }
        }
    }

    // ===== State =====

    pub fn is_running(&self) -> bool {
        self.inner.snapshot().is_running()
    }

    /// Consistent copy of the session
    pub fn snapshot(&self) -> Session {
        self.inner.snapshot()
    }

    pub fn recording_phase(&self) -> RecordingPhase {
        self.inner.recording.phase()
    }

    pub fn registry(&self) -> &TempFileRegistry {
        &self.inner.registry
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    /// Token and snapshot of a running session, or `SessionNotRunning`
    fn running(&self) -> SessionResult<(GenerationToken, Session)> {
        let token = self.inner.gate.token();
        let session = self.inner.snapshot();
        if !session.is_running() || session.generation != token.generation() {
            return Err(SessionError::SessionNotRunning);
        }
        Ok((token, session))
    }

    // ===== Capture =====

    pub async fn capture(&self, request: CaptureRequest) -> SessionResult<CaptureOutput> {
        let (token, session) = self.running()?;
        let ctx = CaptureContext {
            token,
            viewport: session.viewport,
        };
        self.inner.capture.capture(request, &ctx).await
    }

    pub async fn capture_sample(&self, request: CaptureRequest) -> SessionResult<CaptureOutput> {
        let (token, session) = self.running()?;
        let ctx = CaptureContext {
            token,
            viewport: session.viewport,
        };
        self.inner.capture.capture_sample(request, &ctx).await
    }

    // ===== Recording =====

    pub async fn start_recording(&self, options: RecordingOptions) -> SessionResult<()> {
        let _mutation = self.inner.mutation.lock().await;
        let (token, _) = self.running()?;
        self.inner.recording.start(options, &token).await
    }

    pub async fn stop_recording(&self) -> SessionResult<FinishedRecording> {
        let _mutation = self.inner.mutation.lock().await;
        let (token, _) = self
            .running()
            .map_err(|_| SessionError::NoRecordingInProgress)?;
        self.inner.recording.stop(&token).await
    }

    // ===== Zoom & flash =====

    pub fn get_zoom(&self) -> SessionResult<ZoomState> {
        let (_, session) = self.running()?;
        Ok(self.inner.zoom_flash.zoom(session.zoom_factor))
    }

    /// Returns the zoom factor actually applied
    pub fn set_zoom(&self, level: f32, ramp: bool) -> SessionResult<f32> {
        let (token, _) = self.running()?;
        let effective = self.inner.zoom_flash.set_zoom(level, ramp)?;
        self.inner.update(|s| {
            if s.generation == token.generation() {
                s.zoom_factor = effective;
            }
        });
        Ok(effective)
    }

    pub fn get_flash_mode(&self) -> SessionResult<FlashMode> {
        let (_, session) = self.running()?;
        Ok(session.flash_mode)
    }

    pub fn get_supported_flash_modes(&self) -> SessionResult<Vec<FlashMode>> {
        self.running()?;
        Ok(self.inner.zoom_flash.supported_flash_modes())
    }

    /// Returns the mode in effect afterwards
    pub fn set_flash_mode(&self, mode: FlashMode) -> SessionResult<FlashMode> {
        let (token, session) = self.running()?;
        let effective = self.inner.zoom_flash.set_flash_mode(mode, session.flash_mode)?;
        self.inner.update(|s| {
            if s.generation == token.generation() {
                s.flash_mode = effective;
            }
        });
        Ok(effective)
    }

    // ===== Devices & permissions =====

    pub fn get_available_devices(&self) -> Vec<CameraDevice> {
        self.inner.catalog.list()
    }

    pub fn check_permissions(&self) -> PermissionStatus {
        self.inner.permissions.check()
    }

    /// Prompt for the given permissions (both when `None`)
    pub async fn request_permissions(&self, kinds: Option<Vec<PermissionKind>>) -> PermissionStatus {
        let kinds = kinds.unwrap_or_else(|| vec![PermissionKind::Camera, PermissionKind::Microphone]);
        self.inner.permissions.request(&kinds).await
    }

    // ===== Events =====

    /// Subscribe to `barcodeDetected` events
    pub fn subscribe_barcodes(&self) -> broadcast::Receiver<BarcodeEvent> {
        self.inner.scanner.subscribe()
    }
}

/// Watch backend events for one generation; a disconnect of the active
/// device stops the session
async fn monitor_backend(
    inner: Weak<Inner>,
    mut events: broadcast::Receiver<BackendEvent>,
    token: GenerationToken,
    device_id: String,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            event = events.recv() => event,
        };

        match event {
            Ok(BackendEvent::Disconnected { device_id: lost }) if lost == device_id => {
                warn!(device = %lost, "Camera disconnected, stopping session");
                if let Some(inner) = inner.upgrade() {
                    SessionController { inner }.shutdown(StopReason::DeviceLost).await;
                }
                break;
            }
            Ok(BackendEvent::Disconnected { device_id: other }) => {
                debug!(device = %other, "Ignoring disconnect of inactive device");
            }
            Ok(BackendEvent::Error { message }) => {
                warn!(message = %message, "Camera backend reported an error");
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Missed camera backend events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
