use anyhow::Result;
use tokio::sync::mpsc;

/// One slice of captured audio, encoded as 16-bit little-endian PCM.
///
/// Chunks carry no identity beyond their position in the delivery order.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Raw encoded bytes (s16le PCM, mono)
    pub bytes: Vec<u8>,
}

impl AudioChunk {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Configuration for capture backends
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Target sample rate (input is decimated if the device runs faster)
    pub sample_rate: u32,
    /// Target channel count (1 = mono)
    pub channels: u16,
    /// How much audio each chunk holds, in milliseconds
    pub chunk_duration_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000, // 16kHz, what the transcription service expects
            channels: 1,        // Mono
            chunk_duration_ms: 100,
        }
    }
}

/// Audio capture backend trait
///
/// Implementations:
/// - Microphone: cpal default input device (all platforms)
/// - Scripted: replay preset chunks (for testing/batch processing)
#[async_trait::async_trait]
pub trait CaptureBackend: Send {
    /// Start capturing audio.
    ///
    /// Opens the underlying device and returns a channel receiver that yields
    /// chunks in capture order. Fails if the device is unavailable.
    ///
    /// After `stop()`, the final chunk is flushed and the channel closes;
    /// channel close is the session-complete signal and fires exactly once.
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioChunk>>;

    /// Stop capturing audio and release the device.
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Capture source type
#[derive(Debug, Clone)]
pub enum CaptureSource {
    /// Default microphone input
    Microphone,
    /// Preset chunks replayed in order (for testing/batch processing)
    Scripted(Vec<AudioChunk>),
}

/// Capture backend factory
pub struct CaptureBackendFactory;

impl CaptureBackendFactory {
    pub fn create(source: CaptureSource, config: CaptureConfig) -> Result<Box<dyn CaptureBackend>> {
        match source {
            CaptureSource::Microphone => Ok(Box::new(super::mic::MicCapture::new(config))),
            CaptureSource::Scripted(chunks) => Ok(Box::new(super::scripted::ScriptedCapture::new(chunks))),
        }
    }
}
