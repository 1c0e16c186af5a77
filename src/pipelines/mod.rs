// SPDX-License-Identifier: GPL-3.0-only

//! Consumers of the live camera stream
//!
//! ```text
//!                        ┌──────────────────┐     ┌──────────────────┐
//!                   ┌──▶ │  Photo Pipeline  │ ──▶ │ JPEG (inline or  │
//!                   │    │  crop + encode   │     │ temp file)       │
//! ┌──────────────┐  │    └──────────────────┘     └──────────────────┘
//! │ Camera       │ ─┤    ┌──────────────────┐     ┌──────────────────┐
//! │ Backend      │  ├──▶ │  Video Pipeline  │ ──▶ │ Recorder file    │
//! └──────────────┘  │    └──────────────────┘     └──────────────────┘
//!                   │    ┌──────────────────┐     ┌──────────────────┐
//!                   └──▶ │ Barcode Scanner  │ ──▶ │ barcodeDetected  │
//!                        └──────────────────┘     └──────────────────┘
//! ```
//!
//! - [`photo`]: still capture, cropping and JPEG encoding
//! - [`video`]: recording lifecycle
//! - [`barcode`]: rate-limited barcode analysis
//! - [`display`]: frame to preview coordinate mapping

pub mod barcode;
pub mod display;
pub mod photo;
pub mod video;
