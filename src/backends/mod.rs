// SPDX-License-Identifier: GPL-3.0-only

//! Backend abstraction layer for camera capture
//!
//! The session core talks to hardware only through the [`camera::CameraBackend`]
//! trait, so each platform fills in one implementation:
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              Session Controller              │
//! └────────────────────┬────────────────────────┘
//!                      │ CameraBackend
//! ┌────────────────────┴────────────────────────┐
//! │              Backend Layer                   │
//! │  ┌──────────────────┐  ┌─────────────────┐  │
//! │  │ Platform camera  │  │ Virtual camera  │  │
//! │  │   (host glue)    │  │  (in-process)   │  │
//! │  └──────────────────┘  └─────────────────┘  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`camera`]: Backend trait, shared types and device selection
//! - [`virtual_camera`]: Software backend used by the CLI and tests

pub mod camera;
pub mod virtual_camera;
