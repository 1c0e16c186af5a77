// SPDX-License-Identifier: GPL-3.0-only

//! Camera session - one camera session over pluggable hardware backends
//!
//! This library provides a single logical camera session: start it on a
//! device, take photos or record video from it, watch it for barcodes and
//! adjust zoom and flash, with clean teardown of hardware and temp files.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`session`]: Session lifecycle, output coordination, zoom and flash
//! - [`pipelines`]: Photo, video and barcode consumers of the live stream
//! - [`backends`]: Camera backend abstraction and the in-process virtual camera
//! - [`storage`]: Temp-file registry for photo and video artifacts
//! - [`permissions`]: Camera and microphone permission surface
//! - [`api`]: Host bridge request/response types
//! - [`config`]: Settings and start options
//!
//! # Example
//!
//! ```no_run
//! use camera_session::backends::virtual_camera::VirtualBackend;
//! use camera_session::config::StartConfig;
//! use camera_session::pipelines::photo::CaptureRequest;
//! use camera_session::session::SessionController;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), camera_session::errors::SessionError> {
//! let session = SessionController::new(Arc::new(VirtualBackend::new()));
//! session.start(StartConfig::default()).await?;
//! let photo = session
//!     .capture(CaptureRequest { quality: 90, save_to_file: false })
//!     .await?;
//! session.stop().await?;
//! # let _ = photo;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod permissions;
pub mod pipelines;
pub mod session;
pub mod storage;

// Re-export commonly used types
pub use config::{Settings, StartConfig};
pub use errors::{ErrorKind, SessionError, SessionResult};
pub use session::{SessionController, SessionState};
