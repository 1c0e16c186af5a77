// SPDX-License-Identifier: GPL-3.0-only

//! Recording state machine
//!
//! ```text
//! Idle ─start─▶ Starting ─first frame written─▶ Active ─stop─▶ Stopping ─finalized─▶ Idle
//! ```
//!
//! The video temp file is allocated before the hardware start so an
//! interrupted start always leaves something to clean up. The audio input is
//! removed only after the recorder has finalized the file.

use crate::backends::camera::{CameraBackend, OutputKind, RecordingRequest};
use crate::errors::{SessionError, SessionResult};
use crate::permissions::{self, PermissionGate, PermissionKind};
use crate::pipelines::photo::encoder_quality;
use crate::session::generation::GenerationToken;
use crate::session::outputs::OutputCoordinator;
use crate::storage::{TempFile, TempFileKind, TempFileRegistry};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Read-only view of the recorder state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingPhase {
    Idle,
    Starting,
    Active,
    Stopping,
}

/// Parameters of `startRecording()`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordingOptions {
    pub enable_audio: bool,
    /// 0-100
    pub quality: u8,
}

/// A finished recording handed to the caller
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedRecording {
    pub path: PathBuf,
    pub web_path: String,
}

#[derive(Debug, Default)]
enum RecordingState {
    #[default]
    Idle,
    Starting {
        file: TempFile,
        audio: bool,
    },
    Active {
        file: TempFile,
        audio: bool,
        started_at: Instant,
    },
    Stopping {
        file: TempFile,
        audio: bool,
    },
}

impl RecordingState {
    fn phase(&self) -> RecordingPhase {
        match self {
            RecordingState::Idle => RecordingPhase::Idle,
            RecordingState::Starting { .. } => RecordingPhase::Starting,
            RecordingState::Active { .. } => RecordingPhase::Active,
            RecordingState::Stopping { .. } => RecordingPhase::Stopping,
        }
    }

    /// File and audio flag of any non-idle state
    fn into_parts(self) -> Option<(TempFile, bool)> {
        match self {
            RecordingState::Idle => None,
            RecordingState::Starting { file, audio }
            | RecordingState::Active { file, audio, .. }
            | RecordingState::Stopping { file, audio } => Some((file, audio)),
        }
    }
}

/// Timeouts the recorder works with
#[derive(Debug, Clone, Copy)]
pub struct RecordingTimeouts {
    /// Upper bound for the recorder to confirm its first frame
    pub confirm: Duration,
    /// Upper bound for each teardown call
    pub teardown: Duration,
}

pub struct RecordingService {
    backend: Arc<dyn CameraBackend>,
    permissions: Arc<dyn PermissionGate>,
    outputs: Arc<OutputCoordinator>,
    registry: Arc<TempFileRegistry>,
    timeouts: RecordingTimeouts,
    state: Mutex<RecordingState>,
}

impl RecordingService {
    pub fn new(
        backend: Arc<dyn CameraBackend>,
        permissions: Arc<dyn PermissionGate>,
        outputs: Arc<OutputCoordinator>,
        registry: Arc<TempFileRegistry>,
        timeouts: RecordingTimeouts,
    ) -> Self {
        Self {
            backend,
            permissions,
            outputs,
            registry,
            timeouts,
            state: Mutex::new(RecordingState::Idle),
        }
    }

    fn state(&self) -> MutexGuard<'_, RecordingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn phase(&self) -> RecordingPhase {
        self.state().phase()
    }

    /// Start recording; resolves once the first frame is written
    ///
    /// Callers serialise this against stop/flip; the token cancels the
    /// permission prompt, the recorder attach and the hardware start.
    pub async fn start(&self, options: RecordingOptions, token: &GenerationToken) -> SessionResult<()> {
        if self.phase() != RecordingPhase::Idle {
            return Err(SessionError::AlreadyRecording);
        }

        if options.enable_audio {
            token
                .run(permissions::ensure(self.permissions.as_ref(), PermissionKind::Microphone))
                .await??;
        }

        token.run(self.outputs.attach(OutputKind::Recording)).await??;

        let file = match self.registry.allocate(
            TempFileKind::Video,
            self.backend.recording_extension(),
            token.generation(),
        ) {
            Ok(file) => file,
            Err(e) => {
                self.detach_recording_output();
                return Err(e);
            }
        };
        let request = RecordingRequest {
            path: file.path.clone(),
            audio: options.enable_audio,
            quality: encoder_quality(options.quality),
        };
        *self.state() = RecordingState::Starting {
            file,
            audio: options.enable_audio,
        };

        if options.enable_audio {
            if let Err(e) = self.backend.attach_audio_input() {
                self.abandon_start().await;
                return Err(SessionError::HardwareAcquisitionFailed(format!(
                    "cannot add microphone input: {}",
                    e
                )));
            }
        }

        info!(path = %request.path.display(), audio = request.audio, "Starting recording");
        let started = token
            .run_with_timeout(
                self.timeouts.confirm,
                "recording start",
                self.backend.start_recording(request),
            )
            .await;

        match started {
            Ok(Ok(())) => {
                let mut state = self.state();
                if let Some((file, audio)) = std::mem::take(&mut *state).into_parts() {
                    *state = RecordingState::Active {
                        file,
                        audio,
                        started_at: Instant::now(),
                    };
                }
                info!("Recording started");
                Ok(())
            }
            // The session is shutting down; its teardown owns the cleanup
            Err(e @ SessionError::SessionStopped(_)) => Err(e),
            Ok(Err(e)) => {
                error!(error = %e, "Recorder failed to start");
                self.abandon_start().await;
                Err(e.into())
            }
            Err(e) => {
                error!(error = %e, "Recorder did not confirm start");
                self.abandon_start().await;
                Err(e)
            }
        }
    }

    /// Undo a start that failed after the file was allocated
    async fn abandon_start(&self) {
        let parts = std::mem::take(&mut *self.state()).into_parts();
        self.halt_backend().await;
        if let Some((file, audio)) = parts {
            self.release_inputs(audio);
            self.registry.abort(&file.path);
        } else {
            self.detach_recording_output();
        }
    }

    /// Stop recording and hand the finished file to the caller
    pub async fn stop(&self, token: &GenerationToken) -> SessionResult<FinishedRecording> {
        let (file, audio) = {
            let mut state = self.state();
            match std::mem::take(&mut *state) {
                RecordingState::Active {
                    file,
                    audio,
                    started_at,
                } => {
                    info!(
                        elapsed_ms = started_at.elapsed().as_millis() as u64,
                        "Stopping recording"
                    );
                    *state = RecordingState::Stopping {
                        file: file.clone(),
                        audio,
                    };
                    (file, audio)
                }
                other => {
                    *state = other;
                    return Err(SessionError::NoRecordingInProgress);
                }
            }
        };

        let finalized = match token.run(self.backend.stop_recording()).await {
            Ok(result) => result,
            Err(SessionError::SessionStopped(_)) => {
                return Err(SessionError::SessionStopped(
                    "session was stopped during recording".into(),
                ));
            }
            Err(e) => return Err(e),
        };

        *self.state() = RecordingState::Idle;
        self.release_inputs(audio);

        if let Err(e) = finalized {
            error!(error = %e, path = %file.path.display(), "Recording failed to finalize");
            return Err(match (SessionError::from(e), self.registry.release(&file.path)) {
                (SessionError::EncodingFailed(msg), Some(kept)) => SessionError::EncodingFailed(
                    format!("{}; partial recording kept at {}", msg, kept.display()),
                ),
                (err, _) => err,
            });
        }

        if !token.is_current() {
            self.registry.abort(&file.path);
            return Err(SessionError::SessionStopped(
                "session was stopped during recording".into(),
            ));
        }

        let web_path = self.registry.hand_off(&file.path)?;
        info!(path = %file.path.display(), "Recording saved");
        Ok(FinishedRecording {
            path: file.path,
            web_path,
        })
    }

    /// Stop whatever is in progress and discard the result
    ///
    /// Used by session teardown; never fails and never waits longer than
    /// the teardown timeout for the hardware.
    pub async fn force_stop(&self) {
        let Some((file, audio)) = std::mem::take(&mut *self.state()).into_parts() else {
            return;
        };
        warn!(path = %file.path.display(), "Force-stopping recording");
        self.halt_backend().await;
        self.release_inputs(audio);
        self.registry.abort(&file.path);
    }

    /// Bounded hardware stop; "nothing to stop" is fine
    async fn halt_backend(&self) {
        match tokio::time::timeout(self.timeouts.teardown, self.backend.stop_recording()).await {
            Ok(Ok(())) | Ok(Err(crate::backends::camera::BackendError::NoRecordingInProgress)) => {}
            Ok(Err(e)) => warn!(error = %e, "Recorder stop failed during teardown"),
            Err(_) => warn!(
                timeout_ms = self.timeouts.teardown.as_millis() as u64,
                "Recorder stop timed out, abandoning"
            ),
        }
    }

    fn release_inputs(&self, audio: bool) {
        if audio {
            if let Err(e) = self.backend.detach_audio_input() {
                warn!(error = %e, "Failed to remove microphone input");
            }
        }
        self.detach_recording_output();
    }

    fn detach_recording_output(&self) {
        if let Err(e) = self.outputs.detach(OutputKind::Recording) {
            warn!(error = %e, "Failed to detach recording output");
        }
    }
}
