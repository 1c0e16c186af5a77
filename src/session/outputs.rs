// SPDX-License-Identifier: GPL-3.0-only

//! Output consumer bookkeeping
//!
//! The coordinator is the only code that attaches or detaches pipeline
//! outputs. A consumer is recorded as active only after the backend accepted
//! it. Photo captures are counted while in flight so the recorder can wait
//! for them on platforms where both may not run together.

use crate::backends::camera::{CameraBackend, CompatibilityTable, OutputKind};
use crate::errors::{SessionError, SessionResult};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Detach order used on teardown
const TEARDOWN_ORDER: [OutputKind; 4] = [
    OutputKind::Recording,
    OutputKind::Photo,
    OutputKind::BarcodeAnalysis,
    OutputKind::Preview,
];

#[derive(Debug, Default)]
struct ConsumerSet {
    active: HashSet<OutputKind>,
    photos_in_flight: usize,
}

/// Tracks which outputs are attached to the capture pipeline
pub struct OutputCoordinator {
    backend: Arc<dyn CameraBackend>,
    table: CompatibilityTable,
    consumers: Mutex<ConsumerSet>,
    photos_drained: Notify,
    drain_timeout: Duration,
}

impl OutputCoordinator {
    pub fn new(backend: Arc<dyn CameraBackend>, drain_timeout: Duration) -> Self {
        let table = backend.compatibility();
        Self {
            backend,
            table,
            consumers: Mutex::new(ConsumerSet::default()),
            photos_drained: Notify::new(),
            drain_timeout,
        }
    }

    fn consumers(&self) -> MutexGuard<'_, ConsumerSet> {
        self.consumers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True if photos and recording must not be in flight together
    fn photo_recording_exclusive(&self) -> bool {
        self.table.is_exclusive(OutputKind::Photo, OutputKind::Recording)
    }

    /// Attach an output; attaching an already active output is a no-op
    ///
    /// Attaching the recorder where photos and recording are exclusive waits
    /// (bounded) for in-flight captures to finish first.
    pub async fn attach(&self, kind: OutputKind) -> SessionResult<()> {
        if kind != OutputKind::Recording || !self.photo_recording_exclusive() {
            return self.attach_locked(&mut self.consumers(), kind);
        }

        let deadline = tokio::time::Instant::now() + self.drain_timeout;
        loop {
            let drained = self.photos_drained.notified();
            tokio::pin!(drained);
            drained.as_mut().enable();

            {
                let mut consumers = self.consumers();
                if consumers.photos_in_flight == 0 {
                    return self.attach_locked(&mut consumers, kind);
                }
                debug!(
                    in_flight = consumers.photos_in_flight,
                    "Waiting for photo captures before attaching recorder"
                );
            }

            if tokio::time::timeout_at(deadline, drained).await.is_err() {
                warn!("Photo capture did not finish in time, refusing recorder");
                return Err(SessionError::OutputConflict(format!(
                    "photo capture still in flight after {} ms",
                    self.drain_timeout.as_millis()
                )));
            }
        }
    }

    fn attach_locked(&self, consumers: &mut ConsumerSet, kind: OutputKind) -> SessionResult<()> {
        if consumers.active.contains(&kind) {
            return Ok(());
        }
        self.backend.attach_output(kind).map_err(|e| {
            SessionError::OutputConflict(format!("cannot attach {} output: {}", kind, e))
        })?;
        consumers.active.insert(kind);
        info!(output = %kind, "Output attached");
        Ok(())
    }

    /// Detach an output; the consumer is dropped from the set even if the backend fails
    pub fn detach(&self, kind: OutputKind) -> SessionResult<()> {
        if !self.consumers().active.remove(&kind) {
            return Ok(());
        }
        self.backend.detach_output(kind).map_err(|e| {
            SessionError::HardwareAcquisitionFailed(format!(
                "cannot detach {} output: {}",
                kind, e
            ))
        })?;
        info!(output = %kind, "Output detached");
        Ok(())
    }

    /// Detach every active output; reports the first failure after trying all
    pub fn detach_all(&self) -> SessionResult<()> {
        let mut first_error = None;
        for kind in TEARDOWN_ORDER {
            if let Err(e) = self.detach(kind) {
                warn!(output = %kind, error = %e, "Failed to detach output");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Register a photo capture, attaching the photo output on first use
    ///
    /// Rejected with `OutputConflict` while recording on platforms where the
    /// two are exclusive. The capture stays registered until the returned
    /// guard is dropped.
    pub fn begin_photo(&self) -> SessionResult<PhotoInFlight<'_>> {
        let mut consumers = self.consumers();
        if self.photo_recording_exclusive() && consumers.active.contains(&OutputKind::Recording) {
            return Err(SessionError::OutputConflict(
                "photo capture is unavailable while recording on this device".into(),
            ));
        }
        self.attach_locked(&mut consumers, OutputKind::Photo)?;
        consumers.photos_in_flight += 1;
        Ok(PhotoInFlight { coordinator: self })
    }

    fn end_photo(&self) {
        let mut consumers = self.consumers();
        consumers.photos_in_flight = consumers.photos_in_flight.saturating_sub(1);
        if consumers.photos_in_flight == 0 {
            self.photos_drained.notify_waiters();
        }
    }

    pub fn is_active(&self, kind: OutputKind) -> bool {
        self.consumers().active.contains(&kind)
    }

    pub fn active_consumers(&self) -> Vec<OutputKind> {
        let consumers = self.consumers();
        TEARDOWN_ORDER
            .iter()
            .rev()
            .copied()
            .filter(|kind| consumers.active.contains(kind))
            .collect()
    }

    pub fn photos_in_flight(&self) -> usize {
        self.consumers().photos_in_flight
    }
}

/// Registration of one in-flight photo capture
pub struct PhotoInFlight<'a> {
    coordinator: &'a OutputCoordinator,
}

impl Drop for PhotoInFlight<'_> {
    fn drop(&mut self) {
        self.coordinator.end_photo();
    }
}
