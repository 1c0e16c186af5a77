// SPDX-License-Identifier: GPL-3.0-only

//! Session generations
//!
//! Every start, flip and stop advances a generation counter. Operations take
//! a [`GenerationToken`] when they begin and run their suspension points
//! through it: once the generation moves on, the awaited future is dropped
//! and the operation rejects with `SessionStopped`. Results that complete
//! after a generation change are recognised as stale with
//! [`GenerationToken::is_current`].

use crate::errors::{SessionError, SessionResult};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;

/// Why a generation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `stop()` was called
    Stopped,
    /// The session moved to another camera
    Flipped,
    /// The active device disconnected
    DeviceLost,
}

impl StopReason {
    /// Message carried by `SessionStopped` rejections
    pub fn message(&self) -> &'static str {
        match self {
            StopReason::Stopped => "session was stopped",
            StopReason::Flipped => "camera was switched",
            StopReason::DeviceLost => "camera device was disconnected",
        }
    }

    pub fn into_error(self) -> SessionError {
        SessionError::SessionStopped(self.message().to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Epoch {
    generation: u64,
    /// Reason the previous generation ended
    reason: StopReason,
}

/// Owner of the generation counter
pub struct GenerationGate {
    tx: watch::Sender<Epoch>,
}

impl Default for GenerationGate {
    fn default() -> Self {
        Self::new()
    }
}

impl GenerationGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Epoch {
            generation: 0,
            reason: StopReason::Stopped,
        });
        Self { tx }
    }

    pub fn current(&self) -> u64 {
        self.tx.borrow().generation
    }

    /// End the current generation; returns the new one
    pub fn advance(&self, reason: StopReason) -> u64 {
        let mut next = 0;
        self.tx.send_modify(|epoch| {
            epoch.generation += 1;
            epoch.reason = reason;
            next = epoch.generation;
        });
        next
    }

    /// Token bound to the current generation
    pub fn token(&self) -> GenerationToken {
        let rx = self.tx.subscribe();
        let generation = rx.borrow().generation;
        GenerationToken { generation, rx }
    }
}

/// Handle tying an operation to the generation it started in
#[derive(Debug, Clone)]
pub struct GenerationToken {
    generation: u64,
    rx: watch::Receiver<Epoch>,
}

impl GenerationToken {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self) -> bool {
        self.rx.borrow().generation == self.generation
    }

    /// Error for a token whose generation already ended
    pub fn stale_error(&self) -> SessionError {
        self.rx.borrow().reason.into_error()
    }

    /// Fail fast when the generation already ended
    pub fn check(&self) -> SessionResult<()> {
        if self.is_current() {
            Ok(())
        } else {
            Err(self.stale_error())
        }
    }

    /// Resolves once this token's generation has ended
    pub async fn cancelled(&self) -> StopReason {
        let mut rx = self.rx.clone();
        let generation = self.generation;
        match rx.wait_for(|epoch| epoch.generation != generation).await {
            Ok(epoch) => epoch.reason,
            // Gate dropped: the controller is gone
            Err(_) => StopReason::Stopped,
        }
    }

    /// Await `fut` unless the generation ends first
    pub async fn run<F, T>(&self, fut: F) -> SessionResult<T>
    where
        F: Future<Output = T>,
    {
        self.check()?;
        tokio::select! {
            biased;
            reason = self.cancelled() => Err(reason.into_error()),
            value = fut => Ok(value),
        }
    }

    /// Like [`run`](Self::run), with an upper bound
    ///
    /// Expiry is reported as a hardware failure naming `what`.
    pub async fn run_with_timeout<F, T>(&self, limit: Duration, what: &str, fut: F) -> SessionResult<T>
    where
        F: Future<Output = T>,
    {
        match self.run(tokio::time::timeout(limit, fut)).await? {
            Ok(value) => Ok(value),
            Err(_) => Err(SessionError::HardwareAcquisitionFailed(format!(
                "{} timed out after {} ms",
                what,
                limit.as_millis()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_advance_invalidates_tokens() {
        let gate = GenerationGate::new();
        let token = gate.token();
        assert!(token.is_current());

        assert_eq!(gate.advance(StopReason::Stopped), 1);
        assert!(!token.is_current());
        assert!(gate.token().is_current());
        assert_eq!(token.check().unwrap_err().kind(), crate::errors::ErrorKind::SessionStopped);
    }

    #[tokio::test]
    async fn test_run_is_cancelled_by_advance() {
        let gate = std::sync::Arc::new(GenerationGate::new());
        let token = gate.token();

        let advancer = gate.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            advancer.advance(StopReason::DeviceLost);
        });

        let result = token.run(futures::future::pending::<()>()).await;
        assert_eq!(
            result,
            Err(SessionError::SessionStopped(
                "camera device was disconnected".into()
            ))
        );
    }

    #[tokio::test]
    async fn test_run_passes_through_completed_work() {
        let gate = GenerationGate::new();
        let token = gate.token();
        assert_eq!(token.run(async { 7 }).await, Ok(7));
    }

    #[tokio::test]
    async fn test_stale_token_rejects_before_polling() {
        let gate = GenerationGate::new();
        let token = gate.token();
        gate.advance(StopReason::Flipped);

        let polled = std::sync::atomic::AtomicBool::new(false);
        let result = token
            .run(async { polled.store(true, std::sync::atomic::Ordering::SeqCst) })
            .await;
        assert_eq!(result.unwrap_err().to_string(), "Session stopped: camera was switched");
        assert!(!polled.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_maps_to_hardware_failure() {
        let gate = GenerationGate::new();
        let token = gate.token();
        let result = token
            .run_with_timeout(
                Duration::from_millis(50),
                "recording start",
                futures::future::pending::<()>(),
            )
            .await;
        assert_eq!(
            result.unwrap_err().kind(),
            crate::errors::ErrorKind::HardwareAcquisitionFailed
        );
    }
}
