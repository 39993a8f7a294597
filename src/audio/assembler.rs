use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use super::capture::AudioChunk;

/// The full audio byte buffer for one completed session, sent to the
/// transcription service as a single binary message.
pub type AudioPayload = Vec<u8>;

/// Accumulates one session's chunks and concatenates them into a payload.
///
/// Chunks must be appended in delivery order; no reordering check is
/// performed here. Pure in-memory, no I/O.
#[derive(Debug, Default)]
pub struct ChunkAssembler {
    chunks: Vec<AudioChunk>,
    total_bytes: usize,
}

impl ChunkAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one chunk to the current sequence.
    pub fn append(&mut self, chunk: AudioChunk) {
        self.total_bytes += chunk.len();
        self.chunks.push(chunk);
    }

    /// Number of chunks appended since the last `finish()`.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Concatenate all appended chunks into one payload and reset.
    ///
    /// With zero chunks this yields an empty payload; the assembler is
    /// always ready for a new session afterwards.
    pub fn finish(&mut self) -> AudioPayload {
        let chunks = std::mem::take(&mut self.chunks);
        let mut payload = Vec::with_capacity(self.total_bytes);
        for chunk in &chunks {
            payload.extend_from_slice(&chunk.bytes);
        }
        self.total_bytes = 0;
        payload
    }
}

/// Where and how to archive finished session payloads as WAV files.
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    pub output_dir: PathBuf,
    pub sample_rate: u32,
    pub channels: u16,
}

impl ArchiveConfig {
    pub fn new(output_dir: impl AsRef<Path>, sample_rate: u32, channels: u16) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            sample_rate,
            channels,
        }
    }
}

/// Write a session payload (s16le PCM) to `<output_dir>/<session_id>.wav`.
pub fn write_wav(config: &ArchiveConfig, session_id: &str, payload: &[u8]) -> Result<PathBuf> {
    fs::create_dir_all(&config.output_dir).context("failed to create archive directory")?;

    let path = config.output_dir.join(format!("{}.wav", session_id));

    let spec = hound::WavSpec {
        channels: config.channels,
        sample_rate: config.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(&path, spec)
        .with_context(|| format!("failed to create WAV file: {:?}", path))?;

    for sample in payload.chunks_exact(2) {
        writer
            .write_sample(i16::from_le_bytes([sample[0], sample[1]]))
            .context("failed to write sample to WAV")?;
    }

    writer.finalize().context("failed to finalize WAV file")?;

    info!(
        "archived session {} ({} bytes) to {}",
        session_id,
        payload.len(),
        path.display()
    );

    Ok(path)
}
