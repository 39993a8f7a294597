pub mod audio;
pub mod config;
pub mod session;
pub mod stream;

pub use audio::{
    ArchiveConfig, AudioChunk, AudioPayload, CaptureBackend, CaptureBackendFactory, CaptureConfig,
    CaptureSource, ChunkAssembler, MicCapture, ScriptedCapture,
};
pub use config::Config;
pub use session::{
    Command, RecordingSession, SessionController, SessionState, TranscriptEntry, TranscriptLog,
};
pub use stream::{ConnectionState, StreamEvent, TranscriptStream};
