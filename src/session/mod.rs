//! Recording session management
//!
//! This module provides the `SessionController` state machine that ties
//! microphone capture, chunk assembly, and the transcript stream together,
//! plus the append-only transcript log it feeds.

mod controller;
mod transcript;

pub use controller::{Command, RecordingSession, SessionController, SessionState};
pub use transcript::{TranscriptEntry, TranscriptLog};
