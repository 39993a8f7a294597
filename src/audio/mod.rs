pub mod assembler;
pub mod capture;
pub mod mic;
pub mod scripted;

pub use assembler::{write_wav, ArchiveConfig, AudioPayload, ChunkAssembler};
pub use capture::{AudioChunk, CaptureBackend, CaptureBackendFactory, CaptureConfig, CaptureSource};
pub use mic::MicCapture;
pub use scripted::ScriptedCapture;
