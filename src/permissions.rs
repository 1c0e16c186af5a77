// SPDX-License-Identifier: GPL-3.0-only

//! Camera and microphone authorization
//!
//! The prompt UI belongs to the host; this module only defines the query and
//! request surface the session consumes, plus a static gate for hosts without
//! a permission model (and for tests).

use crate::errors::{SessionError, SessionResult};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

/// Authorization state of a single permission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionState {
    Granted,
    Denied,
    /// Not asked yet
    Prompt,
    /// Asked before; the platform wants an explanation shown first
    PromptWithRationale,
}

impl PermissionState {
    pub fn is_granted(&self) -> bool {
        matches!(self, PermissionState::Granted)
    }

    /// True when a request may still change the answer
    pub fn is_undetermined(&self) -> bool {
        matches!(
            self,
            PermissionState::Prompt | PermissionState::PromptWithRationale
        )
    }
}

/// Permissions this crate cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionKind {
    Camera,
    Microphone,
}

impl std::fmt::Display for PermissionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionKind::Camera => write!(f, "camera"),
            PermissionKind::Microphone => write!(f, "microphone"),
        }
    }
}

/// `{camera, microphone}` as reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionStatus {
    pub camera: PermissionState,
    pub microphone: PermissionState,
}

impl PermissionStatus {
    pub fn get(&self, kind: PermissionKind) -> PermissionState {
        match kind {
            PermissionKind::Camera => self.camera,
            PermissionKind::Microphone => self.microphone,
        }
    }

    fn set(&mut self, kind: PermissionKind, state: PermissionState) {
        match kind {
            PermissionKind::Camera => self.camera = state,
            PermissionKind::Microphone => self.microphone = state,
        }
    }
}

/// Permission query and prompt surface provided by the host
pub trait PermissionGate: Send + Sync {
    /// Current state without prompting
    fn check(&self) -> PermissionStatus;

    /// Prompt for the given permissions; resolves with the updated status
    fn request<'a>(&'a self, kinds: &'a [PermissionKind]) -> BoxFuture<'a, PermissionStatus>;
}

/// Make sure one permission is granted, prompting once if undetermined
pub async fn ensure(gate: &dyn PermissionGate, kind: PermissionKind) -> SessionResult<()> {
    let state = gate.check().get(kind);
    if state.is_granted() {
        return Ok(());
    }

    if state.is_undetermined() {
        debug!(%kind, "Permission undetermined, requesting");
        if gate.request(&[kind]).await.get(kind).is_granted() {
            info!(%kind, "Permission granted after prompt");
            return Ok(());
        }
    }

    Err(SessionError::PermissionDenied(kind.to_string()))
}

/// Fixed-answer permission gate
///
/// Prompts resolve to a preconfigured answer per permission and are counted.
pub struct StaticPermissionGate {
    status: Mutex<PermissionStatus>,
    answers: PermissionStatus,
    prompts: AtomicUsize,
}

impl StaticPermissionGate {
    pub fn new(camera: PermissionState, microphone: PermissionState) -> Self {
        let status = PermissionStatus { camera, microphone };
        Self {
            status: Mutex::new(status),
            answers: PermissionStatus {
                camera: PermissionState::Granted,
                microphone: PermissionState::Granted,
            },
            prompts: AtomicUsize::new(0),
        }
    }

    /// Everything already granted
    pub fn granted() -> Self {
        Self::new(PermissionState::Granted, PermissionState::Granted)
    }

    /// What a prompt for `kind` resolves to (defaults to granted)
    pub fn with_prompt_answer(mut self, kind: PermissionKind, answer: PermissionState) -> Self {
        self.answers.set(kind, answer);
        self
    }

    pub fn set(&self, kind: PermissionKind, state: PermissionState) {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set(kind, state);
    }

    /// Number of prompts shown so far
    pub fn prompt_count(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
}

impl PermissionGate for StaticPermissionGate {
    fn check(&self) -> PermissionStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn request<'a>(&'a self, kinds: &'a [PermissionKind]) -> BoxFuture<'a, PermissionStatus> {
        Box::pin(async move {
            let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
            for kind in kinds {
                if status.get(*kind).is_undetermined() {
                    self.prompts.fetch_add(1, Ordering::SeqCst);
                    status.set(*kind, self.answers.get(*kind));
                }
            }
            *status
        })
    }
}
