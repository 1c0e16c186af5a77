// SPDX-License-Identifier: GPL-3.0-only

//! Still photo capture
//!
//! ```text
//! Camera Backend → Still Capture → Crop to Preview → JPEG → Inline / Temp File
//! ```
//!
//! Every stage runs through the caller's generation token: a capture whose
//! session was stopped or flipped while it was in flight is discarded.

pub mod encoding;

pub use encoding::{EncodedPhoto, PhotoEncoder, encoder_quality};

use crate::backends::camera::{CameraBackend, CameraFrame};
use crate::constants::files::PHOTO_EXTENSION;
use crate::errors::{SessionError, SessionResult};
use crate::pipelines::display::{DisplayTransform, PreviewViewport};
use crate::session::generation::GenerationToken;
use crate::session::outputs::OutputCoordinator;
use crate::storage::{TempFileKind, TempFileRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Parameters of one capture
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureRequest {
    /// 0-100
    pub quality: u8,
    pub save_to_file: bool,
}

/// What a capture hands back
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutput {
    /// Encoded JPEG bytes
    Inline(Vec<u8>),
    /// Photo written to a temp file now owned by the caller
    File { path: PathBuf, web_path: String },
}

/// Session state a capture runs against
#[derive(Debug, Clone)]
pub struct CaptureContext {
    pub token: GenerationToken,
    pub viewport: Option<PreviewViewport>,
}

pub struct CaptureService {
    backend: Arc<dyn CameraBackend>,
    outputs: Arc<OutputCoordinator>,
    registry: Arc<TempFileRegistry>,
}

impl CaptureService {
    pub fn new(
        backend: Arc<dyn CameraBackend>,
        outputs: Arc<OutputCoordinator>,
        registry: Arc<TempFileRegistry>,
    ) -> Self {
        Self {
            backend,
            outputs,
            registry,
        }
    }

    /// Full hardware still capture, cropped to what the preview shows
    pub async fn capture(&self, request: CaptureRequest, ctx: &CaptureContext) -> SessionResult<CaptureOutput> {
        ctx.token.check()?;
        let _in_flight = self.outputs.begin_photo()?;

        debug!(quality = request.quality, save = request.save_to_file, "Capturing still");
        let frame = ctx.token.run(self.backend.capture_still()).await??;
        self.finish(frame, request, ctx).await
    }

    /// Capture from the live stream when the backend has a fast path
    pub async fn capture_sample(&self, request: CaptureRequest, ctx: &CaptureContext) -> SessionResult<CaptureOutput> {
        ctx.token.check()?;
        if !self.backend.capabilities().fast_sample {
            return self.capture(request, ctx).await;
        }

        let frame = self.backend.sample_frame()?;
        self.finish(frame, request, ctx).await
    }

    async fn finish(
        &self,
        frame: CameraFrame,
        request: CaptureRequest,
        ctx: &CaptureContext,
    ) -> SessionResult<CaptureOutput> {
        let crop = DisplayTransform::new(frame.width, frame.height, ctx.viewport).crop_rect();
        let encoder = PhotoEncoder::new(request.quality);
        let photo = ctx.token.run(encoder.encode(Arc::new(frame), crop)).await??;
        ctx.token.check()?;

        if !request.save_to_file {
            info!(size = photo.data.len(), "Photo captured");
            return Ok(CaptureOutput::Inline(photo.data));
        }

        let file = self
            .registry
            .allocate(TempFileKind::Photo, PHOTO_EXTENSION, ctx.token.generation())?;

        if let Err(e) = tokio::fs::write(&file.path, &photo.data).await {
            self.registry.abort(&file.path);
            return Err(SessionError::Storage(format!(
                "failed to write {}: {}",
                file.path.display(),
                e
            )));
        }

        if !ctx.token.is_current() {
            self.registry.abort(&file.path);
            return Err(ctx.token.stale_error());
        }

        let web_path = self.registry.hand_off(&file.path).map_err(|e| {
            // The session drained the file between the check and the hand-off
            if ctx.token.is_current() { e } else { ctx.token.stale_error() }
        })?;
        info!(path = %file.path.display(), "Photo saved");
        Ok(CaptureOutput::File {
            path: file.path,
            web_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::CompatibilityTable;
    use crate::backends::virtual_camera::VirtualBackend;
    use crate::session::generation::{GenerationGate, StopReason};
    use crate::storage::FileUrlResolver;
    use std::time::Duration;

    struct Fixture {
        _dir: tempfile::TempDir,
        backend: Arc<VirtualBackend>,
        registry: Arc<TempFileRegistry>,
        service: CaptureService,
        gate: GenerationGate,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(VirtualBackend::new().with_compatibility(CompatibilityTable::permissive()));
        let device = backend.enumerate_cameras().remove(0);
        backend.acquire(&device).await.unwrap();

        let registry = Arc::new(TempFileRegistry::new(
            dir.path().to_path_buf(),
            Arc::new(FileUrlResolver),
        ));
        let outputs = Arc::new(OutputCoordinator::new(backend.clone(), Duration::from_secs(1)));
        let service = CaptureService::new(backend.clone(), outputs, registry.clone());
        Fixture {
            _dir: dir,
            backend,
            registry,
            service,
            gate: GenerationGate::new(),
        }
    }

    fn context(gate: &GenerationGate) -> CaptureContext {
        CaptureContext {
            token: gate.token(),
            viewport: None,
        }
    }

    #[tokio::test]
    async fn test_inline_capture_is_jpeg() {
        let fx = fixture().await;
        let request = CaptureRequest {
            quality: 90,
            save_to_file: false,
        };
        match fx.service.capture(request, &context(&fx.gate)).await.unwrap() {
            CaptureOutput::Inline(data) => assert_eq!(&data[..2], &[0xFF, 0xD8]),
            other => panic!("expected inline photo, got {:?}", other),
        }
        assert!(fx.backend.attached_outputs().contains(&crate::backends::camera::OutputKind::Photo));
    }

    #[tokio::test]
    async fn test_saved_capture_is_handed_off() {
        let fx = fixture().await;
        let request = CaptureRequest {
            quality: 50,
            save_to_file: true,
        };
        match fx.service.capture(request, &context(&fx.gate)).await.unwrap() {
            CaptureOutput::File { path, web_path } => {
                assert!(path.exists());
                assert!(web_path.starts_with("file://"));
                assert!(std::fs::metadata(&path).unwrap().len() > 0);
            }
            other => panic!("expected file, got {:?}", other),
        }
        assert_eq!(fx.registry.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_sample_uses_live_frame() {
        let fx = fixture().await;
        let request = CaptureRequest {
            quality: 80,
            save_to_file: false,
        };
        let output = fx.service.capture_sample(request, &context(&fx.gate)).await.unwrap();
        assert!(matches!(output, CaptureOutput::Inline(ref data) if !data.is_empty()));
        // No still cycle needed
        assert!(!fx.backend.attached_outputs().contains(&crate::backends::camera::OutputKind::Photo));
    }

    #[tokio::test]
    async fn test_stale_token_rejects() {
        let fx = fixture().await;
        let ctx = context(&fx.gate);
        fx.gate.advance(StopReason::Stopped);
        let request = CaptureRequest {
            quality: 90,
            save_to_file: true,
        };
        let err = fx.service.capture(request, &ctx).await.unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::SessionStopped);
        assert_eq!(fx.registry.pending_count(), 0);
    }
}
