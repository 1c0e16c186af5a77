// SPDX-License-Identifier: GPL-3.0-only

//! Video recording pipeline
//!
//! The backend owns the encoder and container; this module owns the
//! recording lifecycle around it: permissions, the recorder output, the
//! temp file and the audio input.

pub mod recorder;

pub use recorder::{
    FinishedRecording, RecordingOptions, RecordingPhase, RecordingService, RecordingTimeouts,
};
